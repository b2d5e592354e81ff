//! Queue intake and slot filling.

use super::Command;
use super::actor::{ActiveEntry, CoordinatorActor, QueuedItem, deliver};
use crate::transport::{PartReporter, PartRequest, Transport};
use crate::types::{DownloadItem, DownloadItemPart, Event, PartState};
use std::sync::Arc;
use tokio::time::Instant;

impl CoordinatorActor {
    /// Accept a validated item: persist, queue, announce, dispatch
    pub(crate) async fn enqueue(&mut self, mut item: DownloadItem) {
        if self.queue.iter().any(|queued| queued.item.id == item.id) {
            tracing::warn!(item_id = %item.id, "Item is already queued, ignoring");
            return;
        }

        for part in &mut item.parts {
            part.reset();
        }

        if let Err(e) = self.store.save_item(&item).await {
            tracing::warn!(item_id = %item.id, error = %e, "Failed to persist queued item");
        }

        // A new session starts once the previous summary is on screen
        if self.summary_emitted {
            self.start_new_session();
        }

        tracing::info!(item_id = %item.id, title = %item.title, parts = item.parts.len(), "Item queued");
        self.emit(Event::ItemQueued { item: item.clone() });
        self.queue.push_back(QueuedItem::new(item));

        self.ensure_running();
        self.fill_slots();
        self.refresh_notification();
    }

    /// Re-queue items loaded from the store at startup
    ///
    /// Rows without parts are deleted from the store instead.
    pub(crate) async fn restore(&mut self, items: Vec<DownloadItem>) {
        for mut item in items {
            if item.parts.is_empty() {
                tracing::warn!(item_id = %item.id, "Dropping persisted item with no parts");
                if let Err(e) = self.store.remove_item(&item.id).await {
                    tracing::warn!(item_id = %item.id, error = %e, "Failed to remove unusable item from store");
                }
                continue;
            }
            // The row is keyed by id, so the copy already queued owns it
            if self.queue.iter().any(|q| q.item.id == item.id) {
                tracing::warn!(item_id = %item.id, "Skipping duplicate persisted item");
                continue;
            }
            for part in &mut item.parts {
                part.reset();
            }
            tracing::debug!(item_id = %item.id, parts = item.parts.len(), "Restored item");
            self.emit(Event::ItemQueued { item: item.clone() });
            self.queue.push_back(QueuedItem::new(item));
        }

        if !self.queue.is_empty() {
            self.ensure_running();
            self.fill_slots();
            self.refresh_notification();
        }
    }

    /// Hand free slots to pending parts, FIFO across items, index order within one
    pub(crate) fn fill_slots(&mut self) {
        let max = self.config.max_concurrent;
        let now = Instant::now();
        let mut started: Vec<(DownloadItemPart, Arc<dyn Transport>)> = Vec::new();

        for queued in self.queue.iter_mut() {
            if self.active.len() >= max {
                break;
            }
            if queued.finishing {
                continue;
            }

            for part in queued.item.parts.iter_mut() {
                if self.active.len() >= max {
                    break;
                }
                if part.state != PartState::Pending {
                    continue;
                }
                if queued
                    .not_before
                    .get(&part.index)
                    .is_some_and(|due| *due > now)
                {
                    continue;
                }
                if part.start().is_err() {
                    continue;
                }
                queued.not_before.remove(&part.index);

                let transport = Arc::clone(self.transports.for_kind(part.transport));
                self.active.insert(
                    part.key(),
                    ActiveEntry {
                        attempt: part.attempts,
                        handle: None,
                        transport: Arc::clone(&transport),
                    },
                );
                started.push((part.clone(), transport));
            }
        }

        for (part, transport) in started {
            tracing::debug!(
                part = %part.key(),
                transport = ?part.transport,
                active = self.active.len(),
                "Starting part"
            );
            self.emit_part(&part);
            self.dispatch(&part, transport);
        }
    }

    fn dispatch(&self, part: &DownloadItemPart, transport: Arc<dyn Transport>) {
        let commands = self.commands.clone();
        let key = part.key();
        let attempt = part.attempts;
        let kind = part.transport;
        let request = PartRequest::from(part);
        let reporter = PartReporter::new(key.clone(), attempt, self.signal_tx.clone());

        tokio::spawn(async move {
            let result = transport.start(&request, reporter).await;
            let sent = deliver(
                &commands,
                Command::Started {
                    key,
                    attempt,
                    kind,
                    result,
                },
            );
            // Coordinator stopped while the transfer was starting
            if let Err(Command::Started {
                key,
                result: Ok(handle),
                ..
            }) = sent
                && let Err(e) = transport.abort(&handle).await
            {
                tracing::warn!(part = %key, error = %e, "Failed to abort orphaned transfer");
            }
        });
    }
}
