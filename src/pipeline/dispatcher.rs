use async_channel::{Receiver, Sender};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{forward, next_item, Flow, PipelineStats};
use crate::error::WatcherError;
use crate::logging::LogContext;
use crate::models::{Block, TransactionPage};

const STAGE: &str = "dispatcher";

/// Splits blocks into transaction page descriptors. No remote calls.
pub struct Dispatcher {
    worker: usize,
    page_size: usize,
    stats: Arc<PipelineStats>,
}

impl Dispatcher {
    pub fn new(worker: usize, page_size: usize, stats: Arc<PipelineStats>) -> Self {
        Self {
            worker,
            page_size,
            stats,
        }
    }

    pub async fn run(
        self,
        blocks: Receiver<Block>,
        pages: Sender<TransactionPage>,
        shutdown: CancellationToken,
    ) -> Result<(), WatcherError> {
        while let Some(block) = next_item(&blocks, &shutdown).await {
            if self.dispatch(&block, &pages, &shutdown).await? == Flow::Stop {
                break;
            }
        }
        Ok(())
    }

    pub async fn dispatch(
        &self,
        block: &Block,
        pages: &Sender<TransactionPage>,
        shutdown: &CancellationToken,
    ) -> Result<Flow, WatcherError> {
        let planned = TransactionPage::plan(&block.id, block.height, block.tx_count, self.page_size);

        LogContext::new(STAGE, "dispatch")
            .with_worker(self.worker)
            .with_height(block.height)
            .with_block_id(&block.id)
            .with_metadata("tx_count", serde_json::json!(block.tx_count))
            .with_metadata("pages", serde_json::json!(planned.len()))
            .debug("Dispatching transaction pages");

        for page in planned {
            PipelineStats::add(&self.stats.pages_dispatched, 1);
            if forward(pages, page, shutdown, STAGE).await? == Flow::Stop {
                return Ok(Flow::Stop);
            }
        }

        Ok(Flow::Continue)
    }
}
