//! Cancellation, shutdown and snapshots.
//!
//! Transport aborts are best-effort. Coordinator bookkeeping is removed
//! whether or not the abort succeeds, so a cancelled part never keeps a slot.

use super::actor::{ActiveEntry, CoordinatorActor};
use crate::types::{Event, ItemId, PartKey, QueueSnapshot};

impl CoordinatorActor {
    pub(crate) async fn cancel_item(&mut self, id: &ItemId) -> bool {
        let Some(position) = self.queue.iter().position(|queued| &queued.item.id == id) else {
            tracing::debug!(item_id = %id, "Cancel for an item that is not queued");
            return false;
        };
        // Every part is terminal and the completion payload is on its way
        if self.queue[position].finishing {
            tracing::debug!(item_id = %id, "Cancel for an item that is already finishing");
            return false;
        }
        self.queue.remove(position);

        let keys: Vec<PartKey> = self
            .active
            .keys()
            .filter(|key| &key.item_id == id)
            .cloned()
            .collect();
        for key in keys {
            if let Some(entry) = self.active.remove(&key) {
                self.abort_entry(&key, entry);
            }
        }

        if let Err(e) = self.store.remove_item(id).await {
            tracing::warn!(item_id = %id, error = %e, "Failed to remove cancelled item from store");
        }

        tracing::info!(item_id = %id, "Item cancelled");
        self.emit(Event::Cancelled { item_id: id.clone() });

        if self.is_idle() {
            self.stop_host();
            self.last_notification = None;
        } else {
            self.fill_slots();
            self.refresh_notification();
        }
        self.check_drained();
        true
    }

    pub(crate) async fn cancel_all(&mut self) -> usize {
        for (key, entry) in std::mem::take(&mut self.active) {
            self.abort_entry(&key, entry);
        }

        let removed: Vec<ItemId> = self.queue.drain(..).map(|queued| queued.item.id).collect();

        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "Failed to clear persisted queue");
        }

        for id in &removed {
            self.emit(Event::Cancelled {
                item_id: id.clone(),
            });
        }

        self.start_new_session();
        self.last_notification = None;
        self.stop_host();

        tracing::info!(items = removed.len(), "All downloads cancelled");
        removed.len()
    }

    /// Abort everything in flight and announce the stop; the store is kept
    pub(crate) async fn shutdown(&mut self) {
        let aborts = std::mem::take(&mut self.active)
            .into_iter()
            .filter_map(|(key, entry)| entry.handle.map(|handle| (key, entry.transport, handle)))
            .map(|(key, transport, handle)| async move {
                if let Err(e) = transport.abort(&handle).await {
                    tracing::warn!(part = %key, error = %e, "Failed to abort transfer on shutdown");
                }
            });
        futures::future::join_all(aborts).await;

        self.stop_host();
        self.emit(Event::Shutdown);
        tracing::info!(queued = self.queue.len(), "Download coordinator shutting down");
    }

    pub(crate) fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            items: self.queue.iter().map(|queued| queued.item.clone()).collect(),
            active_parts: self.active.keys().cloned().collect(),
            counters: self.counters.clone(),
        }
    }

    fn abort_entry(&self, key: &PartKey, entry: ActiveEntry) {
        match entry.handle {
            Some(handle) => self.spawn_abort(key, entry.transport, handle),
            // The start result will find the slot gone and abort then
            None => tracing::debug!(part = %key, "Part released before its transfer started"),
        }
    }
}
