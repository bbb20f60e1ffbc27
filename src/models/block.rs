use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive span of block heights handed to one block fetcher worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeightRange {
    pub start: u64,
    pub end: u64,
}

impl HeightRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(end >= start, "height range {}..={} is inverted", start, end);
        Self { start, end }
    }

    /// Number of heights covered
    pub fn width(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn contains(&self, height: u64) -> bool {
        (self.start..=self.end).contains(&height)
    }

    /// Split `first..=last` into consecutive ranges of at most `width` heights
    pub fn partition(first: u64, last: u64, width: u64) -> Vec<HeightRange> {
        let width = width.max(1);
        let mut ranges = Vec::new();
        let mut start = first;

        while start <= last {
            let end = start.saturating_add(width - 1).min(last);
            ranges.push(HeightRange::new(start, end));
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }

        ranges
    }
}

impl fmt::Display for HeightRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Block header record as served by the explorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block hash
    pub id: String,
    pub height: u64,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub timestamp: u64,
    pub tx_count: usize,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub weight: u64,
    #[serde(default)]
    pub merkle_root: String,
    #[serde(default)]
    pub previousblockhash: Option<String>,
    #[serde(default)]
    pub mediantime: u64,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub bits: u32,
    #[serde(default)]
    pub difficulty: f64,
}
