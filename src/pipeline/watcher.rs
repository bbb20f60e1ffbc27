use async_channel::{Receiver, Sender};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{
    AddressFilter, BlockFetcher, Dispatcher, HeightRangeGenerator, PipelineStats, StageHandle, StatsSnapshot,
    TransactionFetcher,
};
use crate::config::AppConfig;
use crate::error::{PipelineError, WatcherError};
use crate::explorer::{BlockSource, ExplorerClient};
use crate::logging::{ErrorLogger, LogContext, MetricsLogger};
use crate::models::{Block, HeightRange, Transaction, TransactionPage, WatchedAddressSet};

/// Pipeline lifecycle. Transitions only move forward; a closed watcher cannot be restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Running,
    Draining,
    Closed,
}

impl WatcherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatcherState::Idle => "idle",
            WatcherState::Running => "running",
            WatcherState::Draining => "draining",
            WatcherState::Closed => "closed",
        }
    }
}

/// Queue ends created at construction and handed to the workers on start
struct Queues {
    ranges: (Sender<HeightRange>, Receiver<HeightRange>),
    blocks: (Sender<Block>, Receiver<Block>),
    pages: (Sender<TransactionPage>, Receiver<TransactionPage>),
    transactions: (Sender<Transaction>, Receiver<Transaction>),
    output: Sender<Transaction>,
}

/// The complete watcher pipeline.
///
/// Build it, take a handle on [`Watcher::output`], call [`Watcher::start`], and
/// finally [`Watcher::stop`], which returns once every worker has exited.
pub struct Watcher<S: BlockSource> {
    source: Arc<S>,
    config: AppConfig,
    watched: Arc<WatchedAddressSet>,
    stats: Arc<PipelineStats>,
    shutdown: CancellationToken,
    state: watch::Sender<WatcherState>,
    queues: Option<Queues>,
    output: Receiver<Transaction>,
    stages: Vec<StageHandle>,
}

impl Watcher<ExplorerClient> {
    /// Watcher backed by the configured HTTP explorer
    pub fn from_config(config: &AppConfig) -> Result<Self, WatcherError> {
        let client = ExplorerClient::new(&config.explorer)?;
        Self::new(client, config)
    }
}

impl<S: BlockSource> Watcher<S> {
    pub fn new(source: S, config: &AppConfig) -> Result<Self, WatcherError> {
        config.validate()?;

        let queues = &config.queues;
        let (output_tx, output_rx) = async_channel::bounded(queues.output);
        let pending = Queues {
            ranges: async_channel::bounded(queues.height_ranges),
            blocks: async_channel::bounded(queues.blocks),
            pages: async_channel::bounded(queues.transaction_pages),
            transactions: async_channel::bounded(queues.transactions),
            output: output_tx,
        };

        let watched = WatchedAddressSet::new(&config.watcher.watched_addresses);
        LogContext::new("watcher", "new")
            .with_metadata("watched_addresses", json!(watched.len()))
            .with_metadata("start_height", json!(config.watcher.start_height))
            .with_metadata("confirmation_depth", json!(config.watcher.confirmation_depth))
            .debug("Watcher constructed");

        let (state, _) = watch::channel(WatcherState::Idle);

        Ok(Self {
            source: Arc::new(source),
            config: config.clone(),
            watched: Arc::new(watched),
            stats: Arc::new(PipelineStats::new()),
            shutdown: CancellationToken::new(),
            state,
            queues: Some(pending),
            output: output_rx,
            stages: Vec::new(),
        })
    }

    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    /// Observe lifecycle transitions
    pub fn subscribe_state(&self) -> watch::Receiver<WatcherState> {
        self.state.subscribe()
    }

    /// The stream of matched transactions.
    ///
    /// Every call returns a handle on the same queue; it reports closed once the
    /// watcher is closed and the remaining items are drained.
    pub fn output(&self) -> Receiver<Transaction> {
        self.output.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn watched_addresses(&self) -> &WatchedAddressSet {
        &self.watched
    }

    fn transition(&self, next: WatcherState) {
        let previous = self.state.send_replace(next);
        LogContext::new("watcher", "transition")
            .with_metadata("from", json!(previous.as_str()))
            .with_metadata("to", json!(next.as_str()))
            .info(&format!("Watcher {} -> {}", previous.as_str(), next.as_str()));
    }

    /// Spawn every stage. Only valid on an idle watcher.
    pub fn start(&mut self) -> Result<(), WatcherError> {
        let queues = match (self.state(), self.queues.take()) {
            (WatcherState::Idle, Some(queues)) => queues,
            (state, queues) => {
                self.queues = queues;
                return Err(PipelineError::InvalidTransition {
                    operation: "start",
                    state: state.as_str(),
                }
                .into());
            }
        };

        let Queues {
            ranges: (range_tx, range_rx),
            blocks: (block_tx, block_rx),
            pages: (page_tx, page_rx),
            transactions: (tx_tx, tx_rx),
            output: output_tx,
        } = queues;

        let workers = &self.config.workers;
        let retry = &self.config.retry;

        let mut generator = StageHandle::new("height_generator");
        let height_generator = HeightRangeGenerator::new(
            self.source.clone(),
            &self.config.watcher,
            retry.clone(),
            self.stats.clone(),
        );
        generator.spawn(0, height_generator.run(range_tx, self.shutdown.clone()));

        let mut block_fetchers = StageHandle::new("block_fetcher");
        for worker in 0..workers.block_fetchers {
            let fetcher = BlockFetcher::new(worker, self.source.clone(), retry.clone(), self.stats.clone());
            block_fetchers.spawn(worker, fetcher.run(range_rx.clone(), block_tx.clone(), self.shutdown.clone()));
        }

        let mut dispatchers = StageHandle::new("dispatcher");
        for worker in 0..workers.dispatchers {
            let dispatcher = Dispatcher::new(worker, self.config.watcher.tx_page_size, self.stats.clone());
            dispatchers.spawn(worker, dispatcher.run(block_rx.clone(), page_tx.clone(), self.shutdown.clone()));
        }

        let mut transaction_fetchers = StageHandle::new("transaction_fetcher");
        for worker in 0..workers.transaction_fetchers {
            let fetcher = TransactionFetcher::new(worker, self.source.clone(), retry.clone(), self.stats.clone());
            transaction_fetchers.spawn(worker, fetcher.run(page_rx.clone(), tx_tx.clone(), self.shutdown.clone()));
        }

        let mut filters = StageHandle::new("address_filter");
        for worker in 0..workers.filters {
            let filter = AddressFilter::new(self.watched.clone(), self.stats.clone());
            filters.spawn(worker, filter.run(tx_rx.clone(), output_tx.clone(), self.shutdown.clone()));
        }

        // Producer order; stop() joins in this order
        self.stages = vec![generator, block_fetchers, dispatchers, transaction_fetchers, filters];

        LogContext::new("watcher", "start")
            .with_metadata("block_fetchers", json!(workers.block_fetchers))
            .with_metadata("dispatchers", json!(workers.dispatchers))
            .with_metadata("transaction_fetchers", json!(workers.transaction_fetchers))
            .with_metadata("filters", json!(workers.filters))
            .info("Watcher pipeline started");
        self.transition(WatcherState::Running);

        Ok(())
    }

    /// Shut the pipeline down and wait until every worker has exited.
    ///
    /// Nothing is flushed: every stage is cancelled at once, so items still
    /// queued between stages or held by a worker are discarded.
    /// Transactions already on the output queue stay readable until it drains.
    /// `Draining` only marks the window while workers are being joined.
    ///
    /// Returns the first worker failure, if any. Stopping an idle watcher
    /// closes it without starting anything; stopping a closed one does nothing.
    pub async fn stop(&mut self) -> Result<(), WatcherError> {
        match self.state() {
            WatcherState::Closed => return Ok(()),
            WatcherState::Idle => {
                self.queues = None;
                self.transition(WatcherState::Closed);
                return Ok(());
            }
            WatcherState::Running | WatcherState::Draining => {}
        }

        self.transition(WatcherState::Draining);
        self.shutdown.cancel();

        let mut first_error = None;
        for stage in self.stages.drain(..) {
            let name = stage.stage();
            LogContext::new("watcher", "stop")
                .with_metadata("stage", json!(name))
                .debug("Waiting for stage to exit");

            if let Err(error) = stage.join().await {
                ErrorLogger::log_error(&error, Some(LogContext::new("watcher", "stop").with_metadata("stage", json!(name))));
                first_error.get_or_insert(error);
            }
        }

        self.transition(WatcherState::Closed);
        MetricsLogger::log_pipeline_status(WatcherState::Closed.as_str(), &self.stats());

        first_error.map_or(Ok(()), Err)
    }
}

impl<S: BlockSource> Drop for Watcher<S> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExplorerError;
    use async_trait::async_trait;
    use std::time::Duration;

    struct EmptyChain;

    #[async_trait]
    impl BlockSource for EmptyChain {
        async fn tip_height(&self) -> Result<u64, ExplorerError> {
            Ok(10)
        }

        async fn blocks(&self, _start_height: u64) -> Result<Vec<Block>, ExplorerError> {
            Ok(Vec::new())
        }

        async fn transactions(&self, _block_id: &str, _start_index: usize) -> Result<Vec<Transaction>, ExplorerError> {
            Ok(Vec::new())
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.watcher.watched_addresses = vec!["addr1".to_string()];
        config
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = Watcher::new(EmptyChain, &AppConfig::default());
        assert!(matches!(result, Err(WatcherError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_transitions() {
        let mut watcher = Watcher::new(EmptyChain, &config()).unwrap();
        let mut states = watcher.subscribe_state();
        assert_eq!(watcher.state(), WatcherState::Idle);

        watcher.start().unwrap();
        assert_eq!(watcher.state(), WatcherState::Running);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), WatcherState::Running);

        assert!(matches!(
            watcher.start(),
            Err(WatcherError::Pipeline(PipelineError::InvalidTransition { state: "running", .. }))
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        watcher.stop().await.unwrap();
        assert_eq!(watcher.state(), WatcherState::Closed);
        assert!(watcher.output().recv().await.is_err());

        // Stopping twice is harmless, restarting is not allowed
        watcher.stop().await.unwrap();
        assert!(matches!(
            watcher.start(),
            Err(WatcherError::Pipeline(PipelineError::InvalidTransition { state: "closed", .. }))
        ));
    }

    #[tokio::test]
    async fn test_stop_while_idle_closes_output() {
        let mut watcher = Watcher::new(EmptyChain, &config()).unwrap();
        let output = watcher.output();

        watcher.stop().await.unwrap();
        assert_eq!(watcher.state(), WatcherState::Closed);
        assert!(output.recv().await.is_err());
        assert!(watcher.start().is_err());
    }
}
