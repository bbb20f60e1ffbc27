//! The watcher pipeline.
//!
//! ```text
//! generator -> [ranges] -> block fetchers -> [blocks] -> dispatchers
//!     -> [pages] -> transaction fetchers -> [transactions] -> filters -> [output]
//! ```
//!
//! Every stage is a pool of tokio tasks sharing one bounded `async_channel`
//! receiver. A queue closes once the last worker holding its sender exits, so
//! joining stages in pipeline order closes queues producer first.

pub mod address_filter;
pub mod block_fetcher;
pub mod dispatcher;
pub mod height_generator;
pub mod stats;
pub mod transaction_fetcher;
pub mod watcher;

use async_channel::{Receiver, Sender};
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, WatcherError};
use crate::logging::{ErrorLogger, LogContext};

pub use address_filter::AddressFilter;
pub use block_fetcher::BlockFetcher;
pub use dispatcher::Dispatcher;
pub use height_generator::HeightRangeGenerator;
pub use stats::{PipelineStats, StatsSnapshot};
pub use transaction_fetcher::TransactionFetcher;
pub use watcher::{Watcher, WatcherState};

/// Whether a worker should keep going after handing off an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Take the next item, or `None` once shutdown is requested or the queue is closed and empty
pub(crate) async fn next_item<T>(queue: &Receiver<T>, shutdown: &CancellationToken) -> Option<T> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        item = queue.recv() => item.ok(),
    }
}

/// Enqueue onto the next stage, waiting for room.
///
/// A closed queue means a consumer stage went away before its producers,
/// which is a sequencing bug and ends the calling worker.
pub(crate) async fn forward<T>(
    queue: &Sender<T>,
    item: T,
    shutdown: &CancellationToken,
    stage: &'static str,
) -> Result<Flow, WatcherError> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Ok(Flow::Stop),
        sent = queue.send(item) => match sent {
            Ok(()) => Ok(Flow::Continue),
            Err(_) => Err(PipelineError::QueueClosed { stage }.into()),
        },
    }
}

/// Run `future` unless shutdown is requested first
pub(crate) async fn cancellable<F: Future>(shutdown: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        output = future => Some(output),
    }
}

/// The spawned workers of one stage
pub(crate) struct StageHandle {
    stage: &'static str,
    workers: Vec<JoinHandle<Result<(), WatcherError>>>,
}

impl StageHandle {
    pub(crate) fn new(stage: &'static str) -> Self {
        Self {
            stage,
            workers: Vec::new(),
        }
    }

    pub(crate) fn spawn<F>(&mut self, worker: usize, task: F)
    where
        F: Future<Output = Result<(), WatcherError>> + Send + 'static,
    {
        let stage = self.stage;
        self.workers.push(tokio::spawn(async move {
            LogContext::new(stage, "worker").with_worker(worker).trace("Worker started");

            let result = task.await;
            match &result {
                Ok(()) => LogContext::new(stage, "worker").with_worker(worker).trace("Worker exited"),
                Err(error) => {
                    ErrorLogger::log_error(error, Some(LogContext::new(stage, "worker").with_worker(worker)))
                }
            }
            result
        }));
    }

    pub(crate) fn stage(&self) -> &'static str {
        self.stage
    }

    /// Wait for every worker and report the first failure
    pub(crate) async fn join(self) -> Result<(), WatcherError> {
        let mut first_error = None;

        for handle in self.workers {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(PipelineError::WorkerPanic {
                    stage: self.stage,
                    message: e.to_string(),
                }
                .into()),
            };

            if let Err(error) = outcome {
                first_error.get_or_insert(error);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
