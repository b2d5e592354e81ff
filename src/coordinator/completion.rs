//! Item completion and the end-of-session summary.

use super::Command;
use super::actor::{CoordinatorActor, deliver};
use crate::notification;
use crate::post_processing::ScanResult;
use crate::types::{CompletionPayload, Event, ItemId, PartKey, SessionCounters, SessionSummary};
use std::sync::Arc;

impl CoordinatorActor {
    /// Run the completion check for the item owning `key`
    ///
    /// Once every part is terminal the item is marked finishing and handed to
    /// the library scanner; the scan result completes it.
    pub(crate) fn on_part_terminal(&mut self, key: &PartKey) {
        let Some(queued) = self.find_item_mut(&key.item_id) else {
            return;
        };
        if queued.finishing || !queued.item.is_finished() {
            return;
        }
        queued.finishing = true;
        let item = queued.item.clone();

        let commands = self.commands.clone();
        let scanner = Arc::clone(&self.scanner);
        tracing::debug!(item_id = %item.id, "All parts terminal, scanning item");

        tokio::spawn(async move {
            let result = scanner.scan(&item).await;
            deliver(
                &commands,
                Command::Scanned {
                    item_id: item.id,
                    result,
                },
            )
            .ok();
        });
    }

    pub(crate) async fn on_scanned(&mut self, item_id: ItemId, scan_result: ScanResult) {
        let Some(position) = self
            .queue
            .iter()
            .position(|queued| queued.item.id == item_id && queued.finishing)
        else {
            tracing::debug!(item_id = %item_id, "Scan finished for an item that is gone");
            return;
        };
        let Some(queued) = self.queue.remove(position) else {
            return;
        };
        let item = queued.item;

        if let Err(e) = self.store.remove_item(&item.id).await {
            tracing::warn!(item_id = %item.id, error = %e, "Failed to remove finished item from store");
        }

        let payload = CompletionPayload {
            item_id: item.id.clone(),
            folder_id: item.folder.id.clone(),
            title: item.title.clone(),
            failed_parts: item.failed_parts(),
            scan_result,
        };

        if payload.succeeded() {
            self.counters.completed += 1;
            tracing::info!(item_id = %item.id, title = %item.title, "Item downloaded");
        } else {
            self.counters.failed += 1;
            tracing::info!(
                item_id = %item.id,
                title = %item.title,
                failed_parts = payload.failed_parts,
                "Item finished with failed parts"
            );
        }
        self.counters.last_completed_title = Some(item.title.clone());

        self.emit(Event::ItemComplete(payload));

        self.fill_slots();
        self.refresh_notification();
        self.check_drained();
    }

    /// Emit the session summary once the queue and slots are empty
    pub(crate) fn check_drained(&mut self) {
        if !self.is_idle() || self.counters.is_empty() || self.summary_emitted {
            return;
        }

        let summary = summarize(&self.counters);
        tracing::info!(
            completed = self.counters.completed,
            failed = self.counters.failed,
            "Download session finished"
        );

        self.host
            .update_notification(&notification::summary_notification(&summary));
        self.emit(Event::Summary(summary));
        self.summary_emitted = true;
        self.last_notification = None;

        self.summary_generation += 1;
        let generation = self.summary_generation;
        let delay = self.config.summary_display_delay;
        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            deliver(&commands, Command::ResetSummary { generation }).ok();
        });
    }

    /// Display delay elapsed; clear the counters unless a newer session started
    pub(crate) fn reset_summary(&mut self, generation: u64) {
        if generation != self.summary_generation || !self.summary_emitted {
            return;
        }
        tracing::debug!("Resetting session counters");
        self.counters = SessionCounters::default();
        self.summary_emitted = false;
    }

    /// Forget the previous session and invalidate any pending reset
    pub(crate) fn start_new_session(&mut self) {
        self.counters = SessionCounters::default();
        self.summary_emitted = false;
        self.summary_generation += 1;
    }
}

fn summarize(counters: &SessionCounters) -> SessionSummary {
    if counters.completed + counters.failed == 1 {
        SessionSummary::Single {
            title: counters.last_completed_title.clone().unwrap_or_default(),
            success: counters.completed == 1,
        }
    } else {
        SessionSummary::Multiple {
            completed: counters.completed,
            failed: counters.failed,
        }
    }
}
