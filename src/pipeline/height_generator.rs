use async_channel::Sender;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{cancellable, forward, Flow, PipelineStats};
use crate::config::WatcherConfig;
use crate::error::WatcherError;
use crate::explorer::BlockSource;
use crate::logging::{LogContext, MetricsLogger};
use crate::models::HeightRange;
use crate::retry::{RetryConfig, RetryManager};

const STAGE: &str = "height_generator";

/// Turns the growing chain tip into contiguous ranges of unprocessed heights.
///
/// The generator is the only owner of the progress cursor. A `None` cursor
/// means no start height was configured; the first successful tip query then
/// anchors it at the confirmed height without emitting anything.
pub struct HeightRangeGenerator<S: BlockSource> {
    source: Arc<S>,
    retry: RetryManager,
    stats: Arc<PipelineStats>,
    cursor: Option<u64>,
    confirmation_depth: u64,
    range_width: u64,
    poll_interval: Duration,
}

impl<S: BlockSource> HeightRangeGenerator<S> {
    pub fn new(source: Arc<S>, config: &WatcherConfig, retry: RetryConfig, stats: Arc<PipelineStats>) -> Self {
        Self {
            source,
            retry: RetryManager::new("tip_height", retry),
            stats,
            cursor: config.start_height,
            confirmation_depth: config.confirmation_depth,
            range_width: config.block_page_size,
            poll_interval: config.poll_interval(),
        }
    }

    /// Highest height already handed downstream
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    /// Ranges one cycle would emit for the given tip, without touching the cursor
    pub fn plan(&self, tip_height: u64) -> Vec<HeightRange> {
        match (self.cursor, tip_height.checked_sub(self.confirmation_depth)) {
            (Some(cursor), Some(confirmed)) if confirmed > cursor => {
                HeightRange::partition(cursor + 1, confirmed, self.range_width)
            }
            _ => Vec::new(),
        }
    }

    /// One polling cycle: query the tip, emit new ranges, then advance the cursor.
    ///
    /// A failed tip query means no work this cycle.
    pub async fn poll_once(
        &mut self,
        queue: &Sender<HeightRange>,
        shutdown: &CancellationToken,
    ) -> Result<Flow, WatcherError> {
        let source = &self.source;
        let tip = cancellable(
            shutdown,
            self.retry
                .execute(move || async move { source.tip_height().await.map_err(WatcherError::from) }),
        )
        .await;

        let tip_height = match tip {
            None => return Ok(Flow::Stop),
            Some(Ok(height)) => height,
            Some(Err(e)) => {
                LogContext::new(STAGE, "poll")
                    .with_metadata("error", serde_json::json!(e.to_string()))
                    .warn(&format!("Tip height unavailable, skipping cycle: {}", e));
                return Ok(Flow::Continue);
            }
        };

        let Some(confirmed) = tip_height.checked_sub(self.confirmation_depth) else {
            LogContext::new(STAGE, "poll")
                .with_metadata("tip_height", serde_json::json!(tip_height))
                .debug("Chain is shorter than the confirmation depth");
            return Ok(Flow::Continue);
        };

        let Some(cursor) = self.cursor else {
            self.cursor = Some(confirmed);
            LogContext::new(STAGE, "poll")
                .with_height(confirmed)
                .info(&format!("No start height configured, watching blocks after {}", confirmed));
            return Ok(Flow::Continue);
        };

        let ranges = self.plan(tip_height);
        for range in &ranges {
            LogContext::new(STAGE, "emit")
                .with_metadata("range", serde_json::json!(range.to_string()))
                .trace("Emitting height range");

            if forward(queue, *range, shutdown, STAGE).await? == Flow::Stop {
                return Ok(Flow::Stop);
            }
            PipelineStats::add(&self.stats.ranges_emitted, 1);
        }

        let cursor = if ranges.is_empty() { cursor } else { confirmed };
        self.cursor = Some(cursor);
        MetricsLogger::log_cycle(tip_height, confirmed, ranges.len(), cursor);

        Ok(Flow::Continue)
    }

    /// Poll on a fixed interval until shutdown; the first cycle runs immediately
    pub async fn run(mut self, queue: Sender<HeightRange>, shutdown: CancellationToken) -> Result<(), WatcherError> {
        LogContext::new(STAGE, "run")
            .with_metadata("poll_interval_seconds", serde_json::json!(self.poll_interval.as_secs()))
            .with_metadata("cursor", serde_json::json!(self.cursor))
            .info("Height range generator started");

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.poll_once(&queue, &shutdown).await? == Flow::Stop {
                break;
            }
        }

        LogContext::new(STAGE, "run")
            .with_metadata("cursor", serde_json::json!(self.cursor))
            .info("Height range generator stopped");
        Ok(())
    }
}
