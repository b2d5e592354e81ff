//! Download coordinator split into focused submodules.
//!
//! [`DownloadCoordinator`] is a cheap, cloneable handle. All queue, slot and
//! counter state lives in a single actor task that owns it exclusively; the
//! handle, the progress watcher and every transport callback talk to that
//! task through channels, so no two mutations ever interleave.
//!
//! - [`actor`] - Actor state, run loop, shared helpers
//! - [`queue`] - Enqueue, restore, slot filling
//! - [`progress`] - Transport signals, poll results, relocation, failures
//! - [`completion`] - Item completion, session summary
//! - [`control`] - Cancel, cancel-all, shutdown, snapshot
//! - [`watcher`] - The recurring progress watcher task

mod actor;
mod completion;
mod control;
mod progress;
mod queue;
mod watcher;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::db::QueueStore;
use crate::error::{Error, Result};
use crate::host::{BackgroundHost, NoOpHost};
use crate::post_processing::{LibraryScanner, NoOpLibraryScanner, ScanResult};
use crate::retry::{NoRetry, RetryPolicy};
use crate::transport::{PollStatus, TransferHandle, Transport, TransportSet};
use crate::types::{DownloadItem, Event, ItemId, PartKey, QueueSnapshot, TransportKind};
use actor::CoordinatorActor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// External collaborators the coordinator drives
#[derive(Clone)]
pub struct Collaborators {
    /// Direct and managed transports
    pub transports: TransportSet,
    /// Durable queue
    pub store: Arc<dyn QueueStore>,
    /// Post-processing run once per finished item
    pub scanner: Arc<dyn LibraryScanner>,
    /// Foreground process host
    pub host: Arc<dyn BackgroundHost>,
    /// What to do with a failed part
    pub retry: Arc<dyn RetryPolicy>,
}

impl Collaborators {
    /// Transports and store, with no scanner, no host and no retries
    pub fn new(transports: TransportSet, store: Arc<dyn QueueStore>) -> Self {
        Self {
            transports,
            store,
            scanner: Arc::new(NoOpLibraryScanner),
            host: Arc::new(NoOpHost),
            retry: Arc::new(NoRetry),
        }
    }

    /// Use `scanner` for post-processing
    pub fn with_scanner(mut self, scanner: Arc<dyn LibraryScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    /// Use `host` as the foreground process host
    pub fn with_host(mut self, host: Arc<dyn BackgroundHost>) -> Self {
        self.host = host;
        self
    }

    /// Use `retry` for failed parts
    pub fn with_retry(mut self, retry: Arc<dyn RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }
}

/// One active part the watcher should poll this tick
pub(crate) struct PollTarget {
    pub(crate) key: PartKey,
    pub(crate) attempt: u32,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) handle: TransferHandle,
}

/// Poll answer for one [`PollTarget`]
pub(crate) struct PollOutcome {
    pub(crate) key: PartKey,
    pub(crate) attempt: u32,
    pub(crate) result: Result<PollStatus>,
}

/// What the watcher does after a tick
pub(crate) enum TickPlan {
    /// Nothing queued or active; the watcher exits
    Idle,
    /// Poll these parts and report back
    Poll(Vec<PollTarget>),
}

/// Messages processed by the actor, one at a time
pub(crate) enum Command {
    Enqueue {
        item: DownloadItem,
        reply: oneshot::Sender<()>,
    },
    CancelItem {
        id: ItemId,
        reply: oneshot::Sender<bool>,
    },
    CancelAll {
        reply: oneshot::Sender<usize>,
    },
    Snapshot {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    Tick {
        reply: oneshot::Sender<TickPlan>,
    },
    Polled {
        results: Vec<PollOutcome>,
    },
    Started {
        key: PartKey,
        attempt: u32,
        kind: TransportKind,
        result: Result<TransferHandle>,
    },
    Relocated {
        key: PartKey,
        attempt: u32,
        result: Result<PathBuf>,
    },
    Scanned {
        item_id: ItemId,
        result: ScanResult,
    },
    ResetSummary {
        generation: u64,
    },
}

/// Handle to a running download engine
///
/// Clones share the same engine. Dropping every handle stops the engine the
/// same way [`shutdown`](Self::shutdown) does.
#[derive(Clone)]
pub struct DownloadCoordinator {
    commands: mpsc::UnboundedSender<Command>,
    event_tx: broadcast::Sender<Event>,
    config: Arc<Config>,
}

impl DownloadCoordinator {
    /// Validate `config`, restore the persisted queue and start the engine
    ///
    /// Restored items start over: every part goes back to pending and is
    /// dispatched again as slots allow.
    pub async fn start(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let restored = collaborators.store.load_items().await?;
        if !restored.is_empty() {
            tracing::info!(items = restored.len(), "Restoring persisted download queue");
        }

        let (event_tx, _rx) = broadcast::channel(config.event_buffer);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let actor = CoordinatorActor::new(
            config.clone(),
            collaborators,
            event_tx.clone(),
            commands.downgrade(),
            signal_tx,
        );
        tokio::spawn(actor.run(command_rx, signal_rx, restored));

        Ok(Self {
            commands,
            event_tx,
            config: Arc::new(config),
        })
    }

    /// Queue an item for download
    ///
    /// Fails with [`Error::EmptyItemRejected`] if the item has no parts.
    /// Enqueueing an id that is already queued is ignored.
    pub async fn enqueue(&self, item: DownloadItem) -> Result<()> {
        if item.parts.is_empty() {
            tracing::warn!(item_id = %item.id, "Rejecting item with no parts");
            return Err(Error::EmptyItemRejected { id: item.id });
        }
        self.request(|reply| Command::Enqueue { item, reply }).await
    }

    /// Cancel a queued item
    ///
    /// Returns `false` if it was not queued, or if all of its parts already
    /// finished and its completion is being reported.
    pub async fn cancel_item(&self, id: &ItemId) -> Result<bool> {
        let id = id.clone();
        self.request(|reply| Command::CancelItem { id, reply }).await
    }

    /// Cancel everything; returns how many items were removed
    pub async fn cancel_all(&self) -> Result<usize> {
        self.request(|reply| Command::CancelAll { reply }).await
    }

    /// Current queue, active parts and session counters
    pub async fn snapshot(&self) -> Result<QueueSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Stop the engine
    ///
    /// Active transfers are aborted; the persisted queue is left untouched so
    /// the next [`start`](Self::start) picks it up again.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Configuration the engine was started with
    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| Error::ShuttingDown)?;
        rx.await.map_err(|_| Error::ShuttingDown)
    }
}
