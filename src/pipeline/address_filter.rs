use async_channel::{Receiver, Sender};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{forward, next_item, Flow, PipelineStats};
use crate::error::WatcherError;
use crate::logging::MetricsLogger;
use crate::models::{Transaction, WatchedAddressSet};

const STAGE: &str = "address_filter";

/// Forwards transactions paying a watched address and drops the rest
pub struct AddressFilter {
    watched: Arc<WatchedAddressSet>,
    stats: Arc<PipelineStats>,
}

impl AddressFilter {
    pub fn new(watched: Arc<WatchedAddressSet>, stats: Arc<PipelineStats>) -> Self {
        Self { watched, stats }
    }

    pub fn accepts(&self, tx: &Transaction) -> bool {
        self.watched.matches(tx)
    }

    pub async fn run(
        self,
        transactions: Receiver<Transaction>,
        output: Sender<Transaction>,
        shutdown: CancellationToken,
    ) -> Result<(), WatcherError> {
        while let Some(tx) = next_item(&transactions, &shutdown).await {
            if !self.accepts(&tx) {
                continue;
            }

            PipelineStats::add(&self.stats.transactions_matched, 1);
            MetricsLogger::log_match(&tx.txid, tx.status.block_height, self.watched.watched_outputs(&tx).len());

            if forward(&output, tx, &shutdown, STAGE).await? == Flow::Stop {
                break;
            }
        }
        Ok(())
    }
}
