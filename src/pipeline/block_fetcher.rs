use async_channel::{Receiver, Sender};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{cancellable, forward, next_item, Flow, PipelineStats};
use crate::error::WatcherError;
use crate::explorer::BlockSource;
use crate::logging::{LogContext, MetricsLogger};
use crate::models::{Block, HeightRange};
use crate::retry::{RetryConfig, RetryManager};

const STAGE: &str = "block_fetcher";

/// One worker of the block fetcher pool.
///
/// Each height range is walked to completion by a single worker; parallelism
/// comes from several workers taking different ranges.
pub struct BlockFetcher<S: BlockSource> {
    worker: usize,
    source: Arc<S>,
    retry: RetryManager,
    stats: Arc<PipelineStats>,
}

impl<S: BlockSource> BlockFetcher<S> {
    pub fn new(worker: usize, source: Arc<S>, retry: RetryConfig, stats: Arc<PipelineStats>) -> Self {
        Self {
            worker,
            source,
            retry: RetryManager::new("blocks", retry),
            stats,
        }
    }

    pub async fn run(
        self,
        ranges: Receiver<HeightRange>,
        blocks: Sender<Block>,
        shutdown: CancellationToken,
    ) -> Result<(), WatcherError> {
        while let Some(range) = next_item(&ranges, &shutdown).await {
            if self.fetch_range(range, &blocks, &shutdown).await? == Flow::Stop {
                break;
            }
        }
        Ok(())
    }

    /// Forward every block of `range` once, in ascending height order.
    ///
    /// A height whose lookup fails after retries is logged and skipped.
    pub async fn fetch_range(
        &self,
        range: HeightRange,
        blocks: &Sender<Block>,
        shutdown: &CancellationToken,
    ) -> Result<Flow, WatcherError> {
        let mut height = range.start;

        loop {
            let source = &self.source;
            let fetched = cancellable(
                shutdown,
                self.retry
                    .execute(move || async move { source.blocks(height).await.map_err(WatcherError::from) }),
            )
            .await;

            let mut page = match fetched {
                None => return Ok(Flow::Stop),
                Some(Ok(page)) => page,
                Some(Err(e)) => {
                    PipelineStats::add(&self.stats.heights_failed, 1);
                    let context = LogContext::new(STAGE, "fetch_range")
                        .with_worker(self.worker)
                        .with_height(height)
                        .with_metadata("range", serde_json::json!(range.to_string()));
                    MetricsLogger::log_abandoned("height", context, &e);
                    Vec::new()
                }
            };

            // The explorer may hand back neighbours outside the range, or heights already sent
            page.retain(|block| block.height >= height && range.contains(block.height));
            page.sort_by_key(|block| block.height);
            page.dedup_by_key(|block| block.height);

            let last_forwarded = page.last().map_or(height, |block| block.height);
            for block in page {
                LogContext::new(STAGE, "forward")
                    .with_worker(self.worker)
                    .with_height(block.height)
                    .with_block_id(&block.id)
                    .trace("Forwarding block");

                PipelineStats::add(&self.stats.blocks_fetched, 1);
                if forward(blocks, block, shutdown, STAGE).await? == Flow::Stop {
                    return Ok(Flow::Stop);
                }
            }

            match last_forwarded.checked_add(1) {
                Some(next) if next <= range.end => height = next,
                _ => return Ok(Flow::Continue),
            }
        }
    }
}
