use log::{debug, error, info, trace, warn, LevelFilter};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::config::LoggingConfig;
use crate::error::{ErrorSeverity, WatcherError};
use crate::pipeline::StatsSnapshot;

/// Structured logging context for the watcher
pub struct LogContext {
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, Value>,
}

impl LogContext {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_height(self, height: u64) -> Self {
        self.with_metadata("height", json!(height))
    }

    pub fn with_block_id(self, block_id: &str) -> Self {
        self.with_metadata("block_id", json!(block_id))
    }

    pub fn with_txid(self, txid: &str) -> Self {
        self.with_metadata("txid", json!(txid))
    }

    pub fn with_worker(self, worker: usize) -> Self {
        self.with_metadata("worker", json!(worker))
    }

    pub fn with_duration_ms(self, duration_ms: u64) -> Self {
        self.with_metadata("duration_ms", json!(duration_ms))
    }

    pub fn with_retry_count(self, retry_count: u32) -> Self {
        self.with_metadata("retry_count", json!(retry_count))
    }

    fn format_message(&self, level: &str, message: &str) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut log_entry = json!({
            "timestamp": timestamp,
            "level": level,
            "component": self.component,
            "operation": self.operation,
            "message": message,
        });

        for (key, value) in &self.metadata {
            log_entry[key] = value.clone();
        }

        log_entry.to_string()
    }

    pub fn info(&self, message: &str) {
        info!("{}", self.format_message("INFO", message));
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", self.format_message("WARN", message));
    }

    pub fn error(&self, message: &str) {
        error!("{}", self.format_message("ERROR", message));
    }

    pub fn debug(&self, message: &str) {
        debug!("{}", self.format_message("DEBUG", message));
    }

    pub fn trace(&self, message: &str) {
        trace!("{}", self.format_message("TRACE", message));
    }
}

/// Times a single operation and logs its outcome on completion
pub struct PerformanceMonitor {
    pub start_time: Instant,
    operation: String,
    metadata: HashMap<String, Value>,
}

impl PerformanceMonitor {
    pub fn new(operation: &str) -> Self {
        Self {
            start_time: Instant::now(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn finish_with_result<T, E>(self, result: &Result<T, E>) -> u64
    where
        E: std::fmt::Display,
    {
        let duration = self.elapsed_ms();

        let mut context = LogContext::new("performance", &self.operation).with_duration_ms(duration);
        for (key, value) in self.metadata {
            context = context.with_metadata(&key, value);
        }

        match result {
            Ok(_) => context.trace(&format!("Operation completed successfully in {}ms", duration)),
            Err(e) => {
                context = context.with_metadata("error", json!(e.to_string()));
                context.debug(&format!("Operation failed after {}ms: {}", duration, e));
            }
        }

        duration
    }
}

/// Error logging utilities
pub struct ErrorLogger;

impl ErrorLogger {
    pub fn log_error(error: &WatcherError, context: Option<LogContext>) {
        let severity = error.severity();

        let log_context = context
            .unwrap_or_else(|| LogContext::new("error", "unknown"))
            .with_metadata("error_type", json!(format!("{:?}", error)))
            .with_metadata("severity", json!(format!("{:?}", severity)))
            .with_metadata("recoverable", json!(error.is_recoverable()));

        let message = format!("Error occurred: {}", error);

        match severity {
            ErrorSeverity::Critical | ErrorSeverity::High => log_context.error(&message),
            ErrorSeverity::Medium => log_context.warn(&message),
            ErrorSeverity::Low => log_context.info(&message),
        }
    }

    pub fn log_retry_attempt(operation: &str, error: &WatcherError, attempt: u32, max_attempts: u32) {
        let context = LogContext::new("retry", operation)
            .with_retry_count(attempt)
            .with_metadata("max_attempts", json!(max_attempts))
            .with_metadata("error", json!(error.to_string()));

        if attempt >= max_attempts {
            context.warn(&format!("Final attempt failed: {}", error));
        } else {
            context.debug(&format!("Attempt {} of {} failed: {}", attempt, max_attempts, error));
        }
    }

    pub fn log_recovery_success(operation: &str, attempts: u32, total_duration_ms: u64) {
        LogContext::new("retry", "recovered")
            .with_metadata("operation", json!(operation))
            .with_retry_count(attempts)
            .with_duration_ms(total_duration_ms)
            .info(&format!(
                "{} recovered after {} attempts in {}ms",
                operation, attempts, total_duration_ms
            ));
    }
}

/// Pipeline metrics, emitted as structured log lines
pub struct MetricsLogger;

impl MetricsLogger {
    pub fn log_cycle(tip_height: u64, confirmed_height: u64, ranges: usize, cursor: u64) {
        let context = LogContext::new("metrics", "generator_cycle")
            .with_metadata("tip_height", json!(tip_height))
            .with_metadata("confirmed_height", json!(confirmed_height))
            .with_metadata("ranges", json!(ranges))
            .with_metadata("cursor", json!(cursor));

        if ranges > 0 {
            context.info(&format!(
                "Emitted {} height ranges up to confirmed height {}",
                ranges, confirmed_height
            ));
        } else {
            context.debug("No new confirmed blocks");
        }
    }

    pub fn log_explorer_call(endpoint: &str, duration_ms: u64, success: bool) {
        let context = LogContext::new("metrics", "explorer_call")
            .with_metadata("endpoint", json!(endpoint))
            .with_duration_ms(duration_ms)
            .with_metadata("success", json!(success));

        if success {
            context.trace(&format!("{} completed in {}ms", endpoint, duration_ms));
        } else {
            context.debug(&format!("{} failed after {}ms", endpoint, duration_ms));
        }
    }

    pub fn log_abandoned(unit: &str, context: LogContext, error: &WatcherError) {
        context
            .with_metadata("unit", json!(unit))
            .with_metadata("error", json!(error.to_string()))
            .warn(&format!("Abandoned {}: {}", unit, error));
    }

    pub fn log_match(txid: &str, block_height: Option<u64>, watched_outputs: usize) {
        let mut context = LogContext::new("metrics", "transaction_matched")
            .with_txid(txid)
            .with_metadata("watched_outputs", json!(watched_outputs));
        if let Some(height) = block_height {
            context = context.with_height(height);
        }
        context.info(&format!("Transaction {} pays a watched address", txid));
    }

    pub fn log_pipeline_status(state: &str, stats: &StatsSnapshot) {
        LogContext::new("metrics", "pipeline_status")
            .with_metadata("state", json!(state))
            .with_metadata("stats", json!(stats))
            .info(&format!(
                "Watcher {}: {} blocks, {} transactions scanned, {} matched, {} pages abandoned",
                state,
                stats.blocks_fetched,
                stats.transactions_fetched,
                stats.transactions_matched,
                stats.pages_abandoned
            ));
    }
}

/// Initialize logging for the watcher binary.
///
/// `RUST_LOG` wins over the configured level when it is set.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let level: LevelFilter = config
        .level
        .parse()
        .map_err(|_| format!("invalid log level: {}", config.level))?;
    let json_format = config.format == "json";

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    builder
        .format(move |buf, record| {
            use std::io::Write;

            let line = record.args().to_string();
            if json_format {
                return writeln!(buf, "{}", line);
            }

            match serde_json::from_str::<Value>(&line) {
                Ok(entry) if entry.is_object() => writeln!(
                    buf,
                    "{} [{}] {}::{}: {}",
                    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    record.level(),
                    entry["component"].as_str().unwrap_or("-"),
                    entry["operation"].as_str().unwrap_or("-"),
                    entry["message"].as_str().unwrap_or(&line),
                ),
                _ => writeln!(
                    buf,
                    "{} [{}] {}: {}",
                    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    line
                ),
            }
        })
        .try_init()?;

    info!("Logging initialized at level {}", level);
    Ok(())
}
