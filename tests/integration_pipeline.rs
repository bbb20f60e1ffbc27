use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, timeout};

use btc_watcher::config::AppConfig;
use btc_watcher::error::{ConfigError, ExplorerError, WatcherError};
use btc_watcher::explorer::BlockSource;
use btc_watcher::models::{Block, Transaction};
use btc_watcher::pipeline::{StatsSnapshot, Watcher, WatcherState};

/// In-memory chain: every block holds `tx_count` transactions paying "other",
/// except the (height, index) pairs listed in `payees`
struct MockChain {
    tip: u64,
    tx_count: usize,
    payees: HashMap<(u64, usize), &'static str>,
    failing_pages: Mutex<HashMap<(u64, usize), u32>>,
    page_calls: AtomicU32,
    latency: Duration,
}

impl MockChain {
    fn new(tip: u64, tx_count: usize) -> Self {
        Self {
            tip,
            tx_count,
            payees: HashMap::new(),
            failing_pages: Mutex::new(HashMap::new()),
            page_calls: AtomicU32::new(0),
            latency: Duration::ZERO,
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn pay(mut self, height: u64, index: usize, address: &'static str) -> Self {
        self.payees.insert((height, index), address);
        self
    }

    fn fail_page(self, height: u64, start_index: usize, times: u32) -> Self {
        self.failing_pages.lock().unwrap().insert((height, start_index), times);
        self
    }

    fn block(&self, height: u64) -> Block {
        serde_json::from_value(serde_json::json!({
            "id": format!("block-{}", height),
            "height": height,
            "tx_count": self.tx_count,
        }))
        .unwrap()
    }

    fn transaction(&self, height: u64, index: usize) -> Transaction {
        let payee = self.payees.get(&(height, index)).copied().unwrap_or("other");
        serde_json::from_value(serde_json::json!({
            "txid": format!("{}:{}", height, index),
            "vin": [{ "txid": "prev", "vout": 0, "prevout": { "scriptpubkey_address": "sender", "value": 2000 } }],
            "vout": [
                { "scriptpubkey_address": payee, "value": 1000 },
                { "scriptpubkey_type": "op_return", "value": 0 }
            ],
            "status": { "confirmed": true, "block_height": height },
        }))
        .unwrap()
    }
}

#[async_trait]
impl BlockSource for MockChain {
    async fn tip_height(&self) -> Result<u64, ExplorerError> {
        Ok(self.tip)
    }

    async fn blocks(&self, start_height: u64) -> Result<Vec<Block>, ExplorerError> {
        // Newest first, ten per page, like the explorer
        let start_height = start_height.min(self.tip);
        Ok((start_height.saturating_sub(9)..=start_height)
            .rev()
            .map(|height| self.block(height))
            .collect())
    }

    async fn transactions(&self, block_id: &str, start_index: usize) -> Result<Vec<Transaction>, ExplorerError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        let height: u64 = block_id.trim_start_matches("block-").parse().unwrap();

        if let Some(remaining) = self.failing_pages.lock().unwrap().get_mut(&(height, start_index)) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ExplorerError::Status {
                    status: 503,
                    url: format!("/block/{}/txs/{}", block_id, start_index),
                });
            }
        }

        let end = (start_index + 25).min(self.tx_count);
        Ok((start_index..end).map(|i| self.transaction(height, i)).collect())
    }
}

fn config(start_height: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.watcher.watched_addresses = vec!["addr1".to_string()];
    config.watcher.start_height = Some(start_height);
    config.watcher.confirmation_depth = 1;
    config.workers.block_fetchers = 2;
    config.workers.dispatchers = 2;
    config.workers.transaction_fetchers = 4;
    config.workers.filters = 2;
    config
}

/// Poll the stats until `done` holds, advancing virtual time
async fn wait_for<S: BlockSource>(watcher: &Watcher<S>, done: impl Fn(&StatsSnapshot) -> bool) -> StatsSnapshot {
    for _ in 0..600 {
        let stats = watcher.stats();
        if done(&stats) {
            return stats;
        }
        sleep(Duration::from_millis(100)).await;
    }
    panic!("pipeline did not settle: {:?}", watcher.stats());
}

#[tokio::test(start_paused = true)]
async fn test_only_watched_transactions_are_delivered() {
    let chain = MockChain::new(100, 30).pay(95, 27, "addr1").pay(97, 3, "addr2");
    let mut watcher = Watcher::new(chain, &config(90)).unwrap();
    let output = watcher.output();
    watcher.start().unwrap();

    let tx = timeout(Duration::from_secs(30), output.recv())
        .await
        .expect("no match delivered")
        .unwrap();
    assert_eq!(tx.txid, "95:27");

    // Heights 91..=99, two pages of 30 transactions each
    let stats = wait_for(&watcher, |s| s.transactions_fetched == 9 * 30).await;
    assert_eq!(stats.ranges_emitted, 1);
    assert_eq!(stats.blocks_fetched, 9);
    assert_eq!(stats.pages_dispatched, 18);
    assert_eq!(stats.pages_fetched, 18);
    assert_eq!(stats.transactions_matched, 1);
    assert!(output.is_empty());

    watcher.stop().await.unwrap();
    assert_eq!(watcher.state(), WatcherState::Closed);
    assert!(output.recv().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_transient_page_failure_is_retried() {
    let chain = Arc::new(MockChain::new(100, 30).pay(99, 26, "addr1").fail_page(99, 25, 2));
    let mut watcher = Watcher::new(chain.clone(), &config(98)).unwrap();
    let output = watcher.output();

    let started = tokio::time::Instant::now();
    watcher.start().unwrap();

    let tx = timeout(Duration::from_secs(30), output.recv())
        .await
        .expect("page was lost")
        .unwrap();
    assert_eq!(tx.txid, "99:26");
    // Backoff of 1s then 2s before the third attempt
    assert!(started.elapsed() >= Duration::from_secs(3));

    let stats = wait_for(&watcher, |s| s.pages_fetched == 2).await;
    assert_eq!(stats.pages_abandoned, 0);
    assert_eq!(chain.page_calls.load(Ordering::SeqCst), 4);

    watcher.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_page_does_not_stop_the_pipeline() {
    let chain = MockChain::new(100, 30)
        .pay(96, 1, "addr1")
        .pay(98, 29, "addr1")
        .fail_page(96, 0, u32::MAX);
    let mut watcher = Watcher::new(chain, &config(94)).unwrap();
    let output = watcher.output();
    watcher.start().unwrap();

    let tx = timeout(Duration::from_secs(30), output.recv())
        .await
        .expect("surviving match was not delivered")
        .unwrap();
    assert_eq!(tx.txid, "98:29");

    let stats = wait_for(&watcher, |s| s.pages_abandoned == 1 && s.pages_fetched == 9).await;
    assert_eq!(stats.transactions_matched, 1);

    watcher.stop().await.unwrap();
    assert!(output.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_page_size_never_exceeds_one_explorer_call() {
    let chain = Arc::new(MockChain::new(100, 50).pay(99, 30, "addr1"));

    let mut oversized = config(98);
    oversized.watcher.tx_page_size = 50;
    let rejected = Watcher::new(chain.clone(), &oversized);
    assert!(matches!(
        rejected,
        Err(WatcherError::Config(ConfigError::InvalidValue { ref key, .. })) if key == "watcher.tx_page_size"
    ));

    // Smaller pages still cover every index of the block
    let mut config = config(98);
    config.watcher.tx_page_size = 10;
    let mut watcher = Watcher::new(chain.clone(), &config).unwrap();
    let output = watcher.output();
    watcher.start().unwrap();

    let tx = timeout(Duration::from_secs(30), output.recv())
        .await
        .expect("transaction 30 was never fetched")
        .unwrap();
    assert_eq!(tx.txid, "99:30");

    let stats = wait_for(&watcher, |s| s.transactions_fetched == 50).await;
    assert_eq!(stats.pages_dispatched, 5);
    assert_eq!(stats.pages_fetched, 5);
    assert_eq!(chain.page_calls.load(Ordering::SeqCst), 5);

    watcher.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stalled_consumer_bounds_in_flight_work() {
    // 500 blocks of 100 transactions, every one of them pays the watched address
    let mut chain = MockChain::new(501, 100);
    for height in 1..=500 {
        for index in 0..100 {
            chain = chain.pay(height, index, "addr1");
        }
    }

    let mut config = config(0);
    config.queues.output = 2;
    let mut watcher = Watcher::new(chain, &config).unwrap();
    let output = watcher.output();
    watcher.start().unwrap();

    sleep(Duration::from_secs(10)).await;
    let before = watcher.stats();
    sleep(Duration::from_secs(10)).await;
    let after = watcher.stats();

    // Everything upstream is parked on a full queue
    assert_eq!(output.len(), 2);
    assert_eq!(before, after);
    assert!(after.transactions_fetched < 500 * 100);
    assert!(after.transactions_matched <= 2 + config.workers.filters as u64);

    timeout(Duration::from_secs(5), watcher.stop())
        .await
        .expect("stop hung on a full pipeline")
        .unwrap();

    let leftover: Vec<_> = std::iter::from_fn(|| output.try_recv().ok()).collect();
    assert_eq!(leftover.len(), 2);
    assert!(output.recv().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_stop_with_work_in_flight_closes_everything() {
    let chain = MockChain::new(200, 250)
        .pay(10, 0, "addr1")
        .with_latency(Duration::from_millis(100));
    let mut watcher = Watcher::new(chain, &config(0)).unwrap();
    let mut states = watcher.subscribe_state();
    let output = watcher.output();

    watcher.start().unwrap();
    sleep(Duration::from_millis(50)).await;

    timeout(Duration::from_secs(5), watcher.stop())
        .await
        .expect("stop did not return")
        .expect("stop reported a worker failure");

    assert_eq!(*states.borrow_and_update(), WatcherState::Closed);
    while output.try_recv().is_ok() {}
    assert!(output.is_closed());

    let stats = watcher.stats();
    assert!(stats.pages_dispatched > stats.pages_fetched);

    assert!(watcher.start().is_err());
    watcher.stop().await.unwrap();
}
