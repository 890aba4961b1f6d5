//! Offline queue flushing

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Client;
use crate::error::{MorduError, MorduResult};

/// What one flush pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Whether the health probe succeeded
    pub reachable: bool,
    /// `(pending id, server id)` for every entry created
    pub created: Vec<(String, String)>,
    /// Entries left queued after a failed create
    pub failed: usize,
    /// Pending ids the server rejected as invalid, dropped from the queue
    pub rejected: Vec<String>,
}

impl Client {
    /// Try to create every queued reading on the server, in queue order.
    ///
    /// Nothing is sent unless the health probe answers `OK`. A created entry
    /// leaves the queue and its pending id is retired from the cached view,
    /// moving the active reference to the server id. Entries the server
    /// rejects as invalid are dropped, everything else that fails stays.
    pub async fn flush_once(&self) -> MorduResult<FlushReport> {
        let _turn = self.sequencer.lock().await;
        let mut report = FlushReport::default();

        let entries = self.queue.list().await;
        if entries.is_empty() {
            return Ok(report);
        }

        match self.api.health().await {
            Ok(true) => report.reachable = true,
            Ok(false) => {
                debug!("Server reports unhealthy; keeping {} queued", entries.len());
                return Ok(report);
            }
            Err(e) => {
                debug!("Server unreachable ({}); keeping {} queued", e, entries.len());
                return Ok(report);
            }
        }

        for entry in entries {
            match self.api.create_reading(&entry.to_input()).await {
                Ok(created) => {
                    self.queue.remove_by_id(&entry.id).await?;
                    self.cache.retire(&entry.id, &created.id).await?;
                    info!("Uploaded queued reading {} as {}", entry.id, created.id);
                    report.created.push((entry.id, created.id));
                }
                Err(MorduError::Validation(reason)) => {
                    self.queue.remove_by_id(&entry.id).await?;
                    self.cache.forget(&entry.id).await?;
                    warn!("Queued reading {} rejected, dropping it: {}", entry.id, reason);
                    report.rejected.push(entry.id);
                }
                Err(e) => {
                    warn!("Queued reading {} not uploaded: {}", entry.id, e);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

/// Periodic flush task, independent of the server-side sync engine
pub struct QueueFlusher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl QueueFlusher {
    /// First pass after `initial_delay`, then one every `interval` measured
    /// from the end of the previous pass
    pub fn start(client: Arc<Client>, initial_delay: Duration, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }
            loop {
                if let Err(e) = client.flush_once().await {
                    warn!("Queue flush failed: {}", e);
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!("Queue flusher stopped");
        });

        Self { cancel, handle }
    }

    /// Cancel the timer. A pass in flight finishes.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the task to end
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("Queue flusher ended abnormally: {}", e);
        }
    }
}
