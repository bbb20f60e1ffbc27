use thiserror::Error;

/// Main error type for the BTC watcher
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Explorer error: {0}")]
    Explorer(#[from] ExplorerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Errors returned by the remote block explorer
#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Rate limit exceeded for {url}")]
    RateLimit { url: String },

    #[error("Malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    Parsing(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
}

/// Errors raised by the pipeline itself rather than by the data it moves
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Cannot {operation} a watcher in state {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },

    #[error("{stage} tried to enqueue onto a closed queue")]
    QueueClosed { stage: &'static str },

    #[error("{stage} worker panicked: {message}")]
    WorkerPanic { stage: &'static str, message: String },
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Sequencing bugs and unusable configuration
    Critical,
    /// Failures that cost the pipeline a unit of work
    High,
    /// Transient failures that will usually be retried away
    Medium,
    /// Informational
    Low,
}

impl ExplorerError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            ExplorerError::Http(e) => !e.is_decode() && !e.is_builder(),
            ExplorerError::Timeout { .. } => true,
            ExplorerError::Connection(_) => true,
            ExplorerError::RateLimit { .. } => true,
            ExplorerError::Status { status, .. } => *status >= 500,
            ExplorerError::Decode { .. } => false,
        }
    }
}

impl WatcherError {
    /// Get the severity level of an error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WatcherError::Config(_) => ErrorSeverity::Critical,
            WatcherError::Pipeline(PipelineError::QueueClosed { .. }) => ErrorSeverity::Critical,
            WatcherError::Pipeline(PipelineError::WorkerPanic { .. }) => ErrorSeverity::Critical,
            WatcherError::Pipeline(PipelineError::InvalidTransition { .. }) => ErrorSeverity::Low,

            WatcherError::Explorer(ExplorerError::Decode { .. }) => ErrorSeverity::High,
            WatcherError::Explorer(ExplorerError::Status { status, .. }) if *status < 500 => {
                ErrorSeverity::High
            }
            WatcherError::Explorer(_) => ErrorSeverity::Medium,
        }
    }

    /// Check if the error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            WatcherError::Explorer(e) => e.is_recoverable(),
            WatcherError::Config(_) => false,
            WatcherError::Pipeline(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> ExplorerError {
        ExplorerError::Status {
            status,
            url: "http://test/blocks/tip/height".to_string(),
        }
    }

    #[test]
    fn test_error_severity() {
        let critical = WatcherError::Config(ConfigError::UnknownNetwork("regtest".to_string()));
        assert_eq!(critical.severity(), ErrorSeverity::Critical);

        let race = WatcherError::Pipeline(PipelineError::QueueClosed { stage: "filter" });
        assert_eq!(race.severity(), ErrorSeverity::Critical);

        let decode = WatcherError::Explorer(ExplorerError::Decode {
            url: "http://test".to_string(),
            reason: "expected value".to_string(),
        });
        assert_eq!(decode.severity(), ErrorSeverity::High);

        let transient = WatcherError::Explorer(status(503));
        assert_eq!(transient.severity(), ErrorSeverity::Medium);

        let not_found = WatcherError::Explorer(status(404));
        assert_eq!(not_found.severity(), ErrorSeverity::High);
    }

    #[test]
    fn test_error_recoverability() {
        assert!(WatcherError::Explorer(status(500)).is_recoverable());
        assert!(WatcherError::Explorer(status(502)).is_recoverable());
        assert!(!WatcherError::Explorer(status(404)).is_recoverable());

        let rate_limited = WatcherError::Explorer(ExplorerError::RateLimit {
            url: "http://test".to_string(),
        });
        assert!(rate_limited.is_recoverable());

        let timeout = WatcherError::Explorer(ExplorerError::Timeout {
            url: "http://test".to_string(),
        });
        assert!(timeout.is_recoverable());

        let decode = WatcherError::Explorer(ExplorerError::Decode {
            url: "http://test".to_string(),
            reason: "EOF".to_string(),
        });
        assert!(!decode.is_recoverable());

        let transition = WatcherError::Pipeline(PipelineError::InvalidTransition {
            operation: "start",
            state: "closed",
        });
        assert!(!transition.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = WatcherError::Pipeline(PipelineError::InvalidTransition {
            operation: "start",
            state: "running",
        });
        assert_eq!(
            format!("{}", error),
            "Pipeline error: Cannot start a watcher in state running"
        );

        let error = WatcherError::Explorer(status(429));
        assert_eq!(
            format!("{}", error),
            "Explorer error: Unexpected HTTP status 429 from http://test/blocks/tip/height"
        );
    }
}
