use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every stage of a running pipeline
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub ranges_emitted: AtomicU64,
    pub blocks_fetched: AtomicU64,
    pub heights_failed: AtomicU64,
    pub pages_dispatched: AtomicU64,
    pub pages_fetched: AtomicU64,
    pub pages_abandoned: AtomicU64,
    pub transactions_fetched: AtomicU64,
    pub transactions_matched: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub ranges_emitted: u64,
    pub blocks_fetched: u64,
    pub heights_failed: u64,
    pub pages_dispatched: u64,
    pub pages_fetched: u64,
    pub pages_abandoned: u64,
    pub transactions_fetched: u64,
    pub transactions_matched: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ranges_emitted: self.ranges_emitted.load(Ordering::Relaxed),
            blocks_fetched: self.blocks_fetched.load(Ordering::Relaxed),
            heights_failed: self.heights_failed.load(Ordering::Relaxed),
            pages_dispatched: self.pages_dispatched.load(Ordering::Relaxed),
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            pages_abandoned: self.pages_abandoned.load(Ordering::Relaxed),
            transactions_fetched: self.transactions_fetched.load(Ordering::Relaxed),
            transactions_matched: self.transactions_matched.load(Ordering::Relaxed),
        }
    }
}
