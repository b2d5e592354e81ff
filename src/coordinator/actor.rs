//! Actor state and run loop.

use super::{Collaborators, Command};
use crate::config::Config;
use crate::db::QueueStore;
use crate::host::BackgroundHost;
use crate::notification;
use crate::post_processing::LibraryScanner;
use crate::retry::RetryPolicy;
use crate::transport::{PartSignal, TransferHandle, Transport, TransportSet};
use crate::types::{
    DownloadItem, DownloadItemPart, Event, ItemId, Notification, PartKey, SessionCounters,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

/// Send `command` from a task the actor spawned
///
/// The weak sender is upgraded only for the send. The command comes back if
/// the actor is gone.
pub(crate) fn deliver(
    commands: &mpsc::WeakUnboundedSender<Command>,
    command: Command,
) -> std::result::Result<(), Command> {
    match commands.upgrade() {
        Some(sender) => sender.send(command).map_err(|mpsc::error::SendError(c)| c),
        None => Err(command),
    }
}

/// A queued item plus coordinator-only bookkeeping
pub(crate) struct QueuedItem {
    pub(crate) item: DownloadItem,
    /// All parts are terminal and the library scan is in flight
    pub(crate) finishing: bool,
    /// Retried parts may not start before these instants
    pub(crate) not_before: HashMap<usize, Instant>,
}

impl QueuedItem {
    pub(crate) fn new(item: DownloadItem) -> Self {
        Self {
            item,
            finishing: false,
            not_before: HashMap::new(),
        }
    }
}

/// A part holding one concurrency slot
pub(crate) struct ActiveEntry {
    /// Attempt the transport was started for; signals for other attempts are stale
    pub(crate) attempt: u32,
    /// Set once the transport's `start` returned
    pub(crate) handle: Option<TransferHandle>,
    pub(crate) transport: Arc<dyn Transport>,
}

pub(crate) struct CoordinatorActor {
    pub(crate) config: Config,
    pub(crate) transports: TransportSet,
    pub(crate) store: Arc<dyn QueueStore>,
    pub(crate) scanner: Arc<dyn LibraryScanner>,
    pub(crate) host: Arc<dyn BackgroundHost>,
    pub(crate) retry: Arc<dyn RetryPolicy>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Weak so that dropping every handle closes the command channel
    pub(crate) commands: mpsc::WeakUnboundedSender<Command>,
    pub(crate) signal_tx: mpsc::UnboundedSender<PartSignal>,
    pub(crate) queue: VecDeque<QueuedItem>,
    pub(crate) active: BTreeMap<PartKey, ActiveEntry>,
    pub(crate) counters: SessionCounters,
    pub(crate) summary_emitted: bool,
    pub(crate) summary_generation: u64,
    pub(crate) watcher_running: bool,
    pub(crate) host_running: bool,
    pub(crate) last_notification: Option<Notification>,
}

impl CoordinatorActor {
    pub(crate) fn new(
        config: Config,
        collaborators: Collaborators,
        event_tx: broadcast::Sender<Event>,
        commands: mpsc::WeakUnboundedSender<Command>,
        signal_tx: mpsc::UnboundedSender<PartSignal>,
    ) -> Self {
        Self {
            config,
            transports: collaborators.transports,
            store: collaborators.store,
            scanner: collaborators.scanner,
            host: collaborators.host,
            retry: collaborators.retry,
            event_tx,
            commands,
            signal_tx,
            queue: VecDeque::new(),
            active: BTreeMap::new(),
            counters: SessionCounters::default(),
            summary_emitted: false,
            summary_generation: 0,
            watcher_running: false,
            host_running: false,
            last_notification: None,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut signals: mpsc::UnboundedReceiver<PartSignal>,
        restored: Vec<DownloadItem>,
    ) {
        self.restore(restored).await;

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("All coordinator handles dropped");
                        self.shutdown().await;
                        break;
                    };
                    if self.handle(command).await.is_break() {
                        break;
                    }
                }
                Some(signal) = signals.recv() => self.on_signal(signal),
            }
        }

        tracing::info!("Download coordinator stopped");
    }

    async fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Enqueue { item, reply } => {
                self.enqueue(item).await;
                reply.send(()).ok();
            }
            Command::CancelItem { id, reply } => {
                let removed = self.cancel_item(&id).await;
                reply.send(removed).ok();
            }
            Command::CancelAll { reply } => {
                let removed = self.cancel_all().await;
                reply.send(removed).ok();
            }
            Command::Snapshot { reply } => {
                reply.send(self.snapshot()).ok();
            }
            Command::Shutdown { reply } => {
                self.shutdown().await;
                reply.send(()).ok();
                return ControlFlow::Break(());
            }
            Command::Tick { reply } => {
                let plan = self.on_tick();
                reply.send(plan).ok();
            }
            Command::Polled { results } => self.on_polled(results),
            Command::Started {
                key,
                attempt,
                kind,
                result,
            } => self.on_started(key, attempt, kind, result),
            Command::Relocated {
                key,
                attempt,
                result,
            } => self.on_relocated(key, attempt, result),
            Command::Scanned { item_id, result } => self.on_scanned(item_id, result).await,
            Command::ResetSummary { generation } => self.reset_summary(generation),
        }
        ControlFlow::Continue(())
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }

    pub(crate) fn emit_part(&self, part: &DownloadItemPart) {
        self.emit(Event::PartUpdate { part: part.clone() });
    }

    pub(crate) fn find_item_mut(&mut self, id: &ItemId) -> Option<&mut QueuedItem> {
        self.queue.iter_mut().find(|queued| &queued.item.id == id)
    }

    pub(crate) fn find_part(&self, key: &PartKey) -> Option<&DownloadItemPart> {
        self.queue
            .iter()
            .find(|queued| queued.item.id == key.item_id)
            .and_then(|queued| queued.item.parts.get(key.index))
    }

    pub(crate) fn find_part_mut(&mut self, key: &PartKey) -> Option<&mut DownloadItemPart> {
        self.find_item_mut(&key.item_id)
            .and_then(|queued| queued.item.parts.get_mut(key.index))
    }

    /// Whether `attempt` is the live attempt holding a slot for `key`
    pub(crate) fn is_current(&self, key: &PartKey, attempt: u32) -> bool {
        self.active
            .get(key)
            .is_some_and(|entry| entry.attempt == attempt)
    }

    /// Start the host and the watcher if they are not running
    pub(crate) fn ensure_running(&mut self) {
        if !self.host_running {
            tracing::debug!("Starting background host");
            self.host.start();
            self.host_running = true;
        }
        if !self.watcher_running {
            super::watcher::spawn(self.commands.clone(), self.config.tick_interval);
            self.watcher_running = true;
        }
    }

    pub(crate) fn stop_host(&mut self) {
        if self.host_running {
            tracing::debug!("Stopping background host");
            self.host.stop();
            self.host_running = false;
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.active.is_empty()
    }

    /// Push head-of-queue progress to the host when it changed
    pub(crate) fn refresh_notification(&mut self) {
        let Some(current) = notification::project(self.queue.iter().map(|q| &q.item)) else {
            return;
        };
        if self.last_notification.as_ref() == Some(&current) {
            return;
        }
        self.host.update_notification(&current);
        self.emit(Event::Notification(current.clone()));
        self.last_notification = Some(current);
    }

    /// Spawn a best-effort abort of a transfer that no longer holds a slot
    pub(crate) fn spawn_abort(
        &self,
        key: &PartKey,
        transport: Arc<dyn Transport>,
        handle: TransferHandle,
    ) {
        let key = key.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.abort(&handle).await {
                tracing::warn!(part = %key, error = %e, "Failed to abort transfer");
            }
        });
    }
}
