pub mod config;
pub mod error;
pub mod explorer;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod retry;

pub use config::{AppConfig, ExplorerConfig, LoggingConfig, Network, QueueConfig, WatcherConfig, WorkerConfig};
pub use error::{ConfigError, ExplorerError, PipelineError, WatcherError};
pub use explorer::{BlockSource, ExplorerClient};
pub use logging::{init_logging, ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
pub use models::{Block, HeightRange, Transaction, TransactionPage, WatchedAddressSet};
pub use pipeline::{StatsSnapshot, Watcher, WatcherState};
pub use retry::{RetryConfig, RetryManager};
