//! Access to a remote block explorer.
//!
//! The pipeline only ever talks to a [`BlockSource`]; [`ExplorerClient`] is the
//! HTTP implementation against an Esplora-compatible API.

pub mod client;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ExplorerError;
use crate::models::{Block, Transaction};

pub use client::ExplorerClient;

/// Most transactions the explorer returns from one `transactions` call
pub const EXPLORER_TX_PAGE: usize = 25;

/// Remote source of chain data
#[async_trait]
pub trait BlockSource: Send + Sync + 'static {
    /// Height of the current chain tip
    async fn tip_height(&self) -> Result<u64, ExplorerError>;

    /// Up to one page of block records at or below `start_height`, newest first
    async fn blocks(&self, start_height: u64) -> Result<Vec<Block>, ExplorerError>;

    /// Up to one page of the block's transactions, beginning at `start_index`
    async fn transactions(&self, block_id: &str, start_index: usize) -> Result<Vec<Transaction>, ExplorerError>;
}

#[async_trait]
impl<T: BlockSource + ?Sized> BlockSource for Arc<T> {
    async fn tip_height(&self) -> Result<u64, ExplorerError> {
        (**self).tip_height().await
    }

    async fn blocks(&self, start_height: u64) -> Result<Vec<Block>, ExplorerError> {
        (**self).blocks(start_height).await
    }

    async fn transactions(&self, block_id: &str, start_index: usize) -> Result<Vec<Transaction>, ExplorerError> {
        (**self).transactions(block_id, start_index).await
    }
}
