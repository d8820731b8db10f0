//! Background prefetch of the next sequential chunk.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::transport::{ByteRange, FetchResponse, Transport};
use crate::Result;

/// The single outstanding background fetch, tagged with the chunk index it
/// targets and the cache epoch at which it was issued.
struct PrefetchTask {
    index: u64,
    epoch: u64,
    handle: JoinHandle<Result<FetchResponse>>,
}

/// Runs at most one fetch ahead of the reader.
///
/// Results move to the cache only at the explicit drain point in [`take`];
/// a task is never aborted. A task whose target stopped being the next
/// needed chunk simply has its result dropped, and dropping the handle at
/// close detaches the task without cancelling it.
///
/// [`take`]: Prefetcher::take
pub(crate) struct Prefetcher {
    enabled: bool,
    task: Option<PrefetchTask>,
}

impl Prefetcher {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            task: None,
        }
    }

    /// Begin fetching `span` for chunk `index` in the background.
    ///
    /// No-op while a fetch is still in flight: there is no cancellation, so
    /// the running task is left to finish and is judged at the drain point.
    pub(crate) fn trigger(
        &mut self,
        transport: &Arc<dyn Transport>,
        url: &str,
        span: ByteRange,
        conditional: Vec<(String, String)>,
        index: u64,
        epoch: u64,
    ) {
        if !self.enabled {
            return;
        }
        if let Some(task) = &self.task {
            if !task.handle.is_finished() {
                return;
            }
            if task.index == index && task.epoch == epoch {
                // finished result for this exact target; keep it for the drain
                return;
            }
        }

        debug!("Prefetching chunk {} ({})", index, span.header_value());
        let transport = Arc::clone(transport);
        let url = url.to_string();
        let handle =
            tokio::spawn(async move { transport.fetch(&url, Some(span), &conditional).await });
        self.task = Some(PrefetchTask {
            index,
            epoch,
            handle,
        });
    }

    /// Drain point: hand the task's result to the cache if it targets
    /// `(index, epoch)`.
    ///
    /// A running task for the needed target is awaited (the read absorbs the
    /// in-flight fetch instead of duplicating it). A finished task for any
    /// other target is dropped; a running one is left alone. `None` means
    /// the caller must fetch synchronously.
    pub(crate) async fn take(&mut self, index: u64, epoch: u64) -> Option<Result<FetchResponse>> {
        match self.task.take() {
            Some(task) if task.index == index && task.epoch == epoch => {
                match task.handle.await {
                    Ok(result) => Some(result),
                    Err(e) => {
                        debug!("Prefetch task for chunk {} died: {}", index, e);
                        None
                    }
                }
            }
            Some(task) => {
                if task.handle.is_finished() {
                    debug!("Discarding superseded prefetch result for chunk {}", task.index);
                } else {
                    self.task = Some(task);
                }
                None
            }
            None => None,
        }
    }

    /// Forget the outstanding task, releasing its eventual result.
    pub(crate) fn discard(&mut self) {
        self.task = None;
    }
}
