use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::explorer::EXPLORER_TX_PAGE;
use crate::retry::RetryConfig;

const MAINNET_API: &str = "https://blockstream.info/api";
const TESTNET_API: &str = "https://blockstream.info/testnet/api";

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub explorer: ExplorerConfig,
    pub watcher: WatcherConfig,
    pub workers: WorkerConfig,
    pub queues: QueueConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

/// Bitcoin network the explorer serves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Network::Mainnet => MAINNET_API,
            Network::Testnet => TESTNET_API,
        }
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => Err(ConfigError::UnknownNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

/// Block explorer client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    pub network: Network,
    /// Overrides the network's default endpoint when set
    pub base_url: Option<String>,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

/// What to watch and how far behind the tip to stay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Last height treated as already processed. Unset means "start at the
    /// confirmed tip observed on the first cycle".
    pub start_height: Option<u64>,
    /// Blocks subtracted from the tip before a height is scanned
    pub confirmation_depth: u64,
    /// Seconds between tip polls
    pub poll_interval_seconds: u64,
    /// Maximum number of heights per height range
    pub block_page_size: u64,
    /// Number of transactions per transaction page
    pub tx_page_size: usize,
    pub watched_addresses: Vec<String>,
}

/// Worker count per stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub block_fetchers: usize,
    pub dispatchers: usize,
    pub transaction_fetchers: usize,
    pub filters: usize,
}

/// Bounded queue depth between stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub height_ranges: usize,
    pub blocks: usize,
    pub transaction_pages: usize,
    pub transactions: usize,
    pub output: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            base_url: None,
            timeout_seconds: 30,
        }
    }
}

impl ExplorerConfig {
    pub fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            start_height: None,
            confirmation_depth: 1,
            poll_interval_seconds: 60,
            block_page_size: 10,
            tx_page_size: EXPLORER_TX_PAGE,
            watched_addresses: Vec::new(),
        }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            block_fetchers: 10,
            dispatchers: 4,
            transaction_fetchers: 20,
            filters: 10,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            height_ranges: 10,
            blocks: 10,
            transaction_pages: 100,
            transactions: 100,
            output: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables.
    /// Environment variables take precedence over file values.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the TOML file named by `CONFIG_FILE`
    /// (default `config.toml`). A missing file yields the defaults.
    pub fn load_from_file() -> Result<Self, ConfigError> {
        let config_path = env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if !Path::new(&config_path).exists() {
            return Ok(Self::default());
        }

        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(network) = parse_env::<String>("BTC_NETWORK")? {
            self.explorer.network = network.parse()?;
        }
        if let Ok(url) = env::var("EXPLORER_URL") {
            self.explorer.base_url = Some(url);
        }
        if let Some(timeout) = parse_env("EXPLORER_TIMEOUT_SECONDS")? {
            self.explorer.timeout_seconds = timeout;
        }

        if let Ok(addresses) = env::var("WATCHED_ADDRESSES") {
            self.watcher.watched_addresses = addresses
                .split(',')
                .map(str::trim)
                .filter(|address| !address.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(height) = parse_env("START_HEIGHT")? {
            self.watcher.start_height = Some(height);
        }
        if let Some(depth) = parse_env("CONFIRMATION_DEPTH")? {
            self.watcher.confirmation_depth = depth;
        }
        if let Some(interval) = parse_env("POLL_INTERVAL_SECONDS")? {
            self.watcher.poll_interval_seconds = interval;
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.explorer.base_url();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(base_url));
        }
        if self.explorer.timeout_seconds == 0 || self.explorer.timeout_seconds > 300 {
            return Err(invalid("explorer.timeout_seconds", self.explorer.timeout_seconds));
        }

        if self.watcher.poll_interval_seconds == 0 {
            return Err(invalid("watcher.poll_interval_seconds", 0));
        }
        if self.watcher.block_page_size == 0 {
            return Err(invalid("watcher.block_page_size", 0));
        }
        // One page descriptor is fetched with a single explorer call
        if self.watcher.tx_page_size == 0 || self.watcher.tx_page_size > EXPLORER_TX_PAGE {
            return Err(invalid("watcher.tx_page_size", self.watcher.tx_page_size));
        }
        if self.watcher.watched_addresses.iter().all(|a| a.trim().is_empty()) {
            return Err(invalid("watcher.watched_addresses", "[]"));
        }

        let workers = [
            ("workers.block_fetchers", self.workers.block_fetchers),
            ("workers.dispatchers", self.workers.dispatchers),
            ("workers.transaction_fetchers", self.workers.transaction_fetchers),
            ("workers.filters", self.workers.filters),
        ];
        let queues = [
            ("queues.height_ranges", self.queues.height_ranges),
            ("queues.blocks", self.queues.blocks),
            ("queues.transaction_pages", self.queues.transaction_pages),
            ("queues.transactions", self.queues.transactions),
            ("queues.output", self.queues.output),
        ];
        for (key, value) in workers.iter().chain(queues.iter()) {
            if *value == 0 {
                return Err(invalid(key, value));
            }
        }

        if self.retry.max_attempts == 0 || self.retry.max_attempts > 20 {
            return Err(invalid("retry.max_attempts", self.retry.max_attempts));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid("retry.backoff_multiplier", self.retry.backoff_multiplier));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(invalid("logging.level", &self.logging.level));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(invalid("logging.format", &self.logging.format));
        }

        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample_config() -> Result<String, ConfigError> {
        toml::to_string_pretty(&Self::default()).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Parsing(e.to_string()))?;
        fs::write(path, content).map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        Ok(())
    }
}
