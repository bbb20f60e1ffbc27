use async_channel::{Receiver, Sender};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{cancellable, forward, next_item, Flow, PipelineStats};
use crate::error::WatcherError;
use crate::explorer::BlockSource;
use crate::logging::{LogContext, MetricsLogger};
use crate::models::{Transaction, TransactionPage};
use crate::retry::{RetryConfig, RetryManager};

const STAGE: &str = "transaction_fetcher";

/// One worker of the transaction fetcher pool
pub struct TransactionFetcher<S: BlockSource> {
    worker: usize,
    source: Arc<S>,
    retry: RetryManager,
    stats: Arc<PipelineStats>,
}

impl<S: BlockSource> TransactionFetcher<S> {
    pub fn new(worker: usize, source: Arc<S>, retry: RetryConfig, stats: Arc<PipelineStats>) -> Self {
        Self {
            worker,
            source,
            retry: RetryManager::new("transactions", retry),
            stats,
        }
    }

    pub async fn run(
        self,
        pages: Receiver<TransactionPage>,
        transactions: Sender<Transaction>,
        shutdown: CancellationToken,
    ) -> Result<(), WatcherError> {
        while let Some(page) = next_item(&pages, &shutdown).await {
            if self.fetch_page(&page, &transactions, &shutdown).await? == Flow::Stop {
                break;
            }
        }
        Ok(())
    }

    /// Fetch one page with retries and forward its transactions.
    ///
    /// A page that still fails after the last attempt is abandoned.
    pub async fn fetch_page(
        &self,
        page: &TransactionPage,
        transactions: &Sender<Transaction>,
        shutdown: &CancellationToken,
    ) -> Result<Flow, WatcherError> {
        let source = &self.source;
        let block_id = page.block_id.as_str();
        let start_index = page.start_index;

        let fetched = cancellable(
            shutdown,
            self.retry.execute(move || async move {
                source
                    .transactions(block_id, start_index)
                    .await
                    .map_err(WatcherError::from)
            }),
        )
        .await;

        let mut batch = match fetched {
            None => return Ok(Flow::Stop),
            Some(Ok(batch)) => batch,
            Some(Err(e)) => {
                PipelineStats::add(&self.stats.pages_abandoned, 1);
                let context = LogContext::new(STAGE, "fetch_page")
                    .with_worker(self.worker)
                    .with_height(page.block_height)
                    .with_block_id(&page.block_id)
                    .with_metadata("start_index", serde_json::json!(page.start_index))
                    .with_metadata("end_index", serde_json::json!(page.end_index));
                MetricsLogger::log_abandoned("transaction page", context, &e);
                return Ok(Flow::Continue);
            }
        };

        batch.truncate(page.width());
        PipelineStats::add(&self.stats.pages_fetched, 1);
        PipelineStats::add(&self.stats.transactions_fetched, batch.len() as u64);

        LogContext::new(STAGE, "fetch_page")
            .with_worker(self.worker)
            .with_block_id(&page.block_id)
            .with_metadata("start_index", serde_json::json!(page.start_index))
            .with_metadata("transactions", serde_json::json!(batch.len()))
            .trace("Fetched transaction page");

        for tx in batch {
            if forward(transactions, tx, shutdown, STAGE).await? == Flow::Stop {
                return Ok(Flow::Stop);
            }
        }

        Ok(Flow::Continue)
    }
}
