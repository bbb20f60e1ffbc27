use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::error::WatcherError;
use crate::logging::{ErrorLogger, LogContext};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add +-5% jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Retry mechanism with exponential backoff
pub struct RetryManager {
    config: RetryConfig,
    operation_name: String,
}

impl RetryManager {
    pub fn new(operation_name: &str, config: RetryConfig) -> Self {
        Self {
            config,
            operation_name: operation_name.to_string(),
        }
    }

    /// Execute an operation with retry logic.
    ///
    /// Non-recoverable errors are returned immediately; recoverable ones are
    /// retried until `max_attempts` is reached and the last error is returned.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, WatcherError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, WatcherError>>,
    {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        ErrorLogger::log_recovery_success(
                            &self.operation_name,
                            attempt,
                            started.elapsed().as_millis() as u64,
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            if !error.is_recoverable() {
                LogContext::new("retry", &self.operation_name)
                    .with_retry_count(attempt)
                    .with_metadata("reason", serde_json::json!("non_recoverable"))
                    .debug(&format!("Non-recoverable error, not retrying: {}", error));
                return Err(error);
            }

            ErrorLogger::log_retry_attempt(&self.operation_name, &error, attempt, max_attempts);
            if attempt >= max_attempts {
                return Err(error);
            }

            let delay = self.calculate_delay(attempt);
            LogContext::new("retry", &self.operation_name)
                .with_retry_count(attempt)
                .with_metadata("delay_ms", serde_json::json!(delay.as_millis() as u64))
                .debug(&format!(
                    "Retrying in {}ms (attempt {} of {})",
                    delay.as_millis(),
                    attempt + 1,
                    max_attempts
                ));

            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay_ms as f64;
        let exponential_delay =
            base_delay * self.config.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let capped_delay = exponential_delay.min(self.config.max_delay_ms as f64);

        let final_delay = if self.config.jitter {
            let jitter = capped_delay * 0.1 * (rand::random::<f64>() - 0.5);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}
