//! Applying transport results to part state.
//!
//! Every path that can end a part funnels into [`CoordinatorActor::finish_part`]
//! or [`CoordinatorActor::fail_part`], which release the slot and run the
//! item completion check.

use super::actor::{CoordinatorActor, deliver};
use super::{Command, PollOutcome, PollTarget, TickPlan};
use crate::error::{Error, Result};
use crate::retry::PartFailure;
use crate::tracker::percent_of;
use crate::transport::{PartRequest, PartSignal, PollStatus, TransferHandle, TransferSignal};
use crate::types::{PartKey, PartState, TransportKind};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;

impl CoordinatorActor {
    /// Watcher tick: refill, then hand back the parts that need polling
    pub(crate) fn on_tick(&mut self) -> TickPlan {
        self.fill_slots();

        if self.is_idle() {
            tracing::debug!("Queue drained, stopping progress watcher");
            self.watcher_running = false;
            self.stop_host();
            return TickPlan::Idle;
        }

        let targets = self
            .active
            .iter()
            .filter_map(|(key, entry)| {
                let handle = entry.handle.clone()?;
                self.find_part(key)
                    .is_some_and(|part| part.is_pollable())
                    .then(|| PollTarget {
                        key: key.clone(),
                        attempt: entry.attempt,
                        transport: Arc::clone(&entry.transport),
                        handle,
                    })
            })
            .collect();

        TickPlan::Poll(targets)
    }

    pub(crate) fn on_polled(&mut self, results: Vec<PollOutcome>) {
        for PollOutcome {
            key,
            attempt,
            result,
        } in results
        {
            // Anything that moved on since the poll was issued is stale
            if !self.is_current(&key, attempt)
                || self.find_part(&key).map(|p| p.state) != Some(PartState::Downloading)
            {
                continue;
            }

            match result {
                Ok(PollStatus::Progress {
                    bytes_so_far,
                    total_bytes,
                }) => {
                    let percent = percent_of(bytes_so_far, total_bytes);
                    self.apply_progress(&key, bytes_so_far, total_bytes, percent);
                }
                Ok(PollStatus::Completed { bytes }) => self.complete_part(&key, bytes),
                Ok(PollStatus::Failed {
                    reason,
                    http_status,
                }) => {
                    let error = match (http_status, self.find_part(&key)) {
                        (Some(status), Some(part)) => Error::HttpStatus {
                            status,
                            url: part.source_url.to_string(),
                        },
                        _ => Error::transfer(reason),
                    };
                    self.fail_part(&key, error);
                }
                Err(e) => self.fail_part(&key, e),
            }
        }

        self.fill_slots();
        self.refresh_notification();
    }

    /// Push-style report from a direct transfer
    pub(crate) fn on_signal(&mut self, signal: PartSignal) {
        let PartSignal {
            key,
            attempt,
            signal,
        } = signal;

        if !self.is_current(&key, attempt) {
            if self.find_part(&key).is_none() {
                let e = Error::OwnerNotFound {
                    id: key.item_id.clone(),
                };
                tracing::debug!(part = %key, error = %e, "Dropping late transfer signal");
            } else {
                tracing::debug!(part = %key, attempt, "Dropping stale transfer signal");
            }
            return;
        }

        match signal {
            TransferSignal::Progress {
                bytes_written,
                total_bytes,
                percent,
            } => self.apply_progress(&key, bytes_written, total_bytes, percent),
            TransferSignal::Completed { bytes_written } => {
                self.complete_part(&key, bytes_written);
                self.fill_slots();
            }
            TransferSignal::Failed(e) => {
                self.fail_part(&key, e);
                self.fill_slots();
            }
        }

        self.refresh_notification();
    }

    pub(crate) fn on_started(
        &mut self,
        key: PartKey,
        attempt: u32,
        kind: TransportKind,
        result: Result<TransferHandle>,
    ) {
        if !self.is_current(&key, attempt) {
            // Cancelled or already finished while the transport was starting
            if let Ok(handle) = result {
                let finished = self
                    .find_part(&key)
                    .is_some_and(|part| part.is_terminal() && !part.failed);
                if !finished {
                    tracing::debug!(part = %key, "Aborting transfer started for a released slot");
                    let transport = Arc::clone(self.transports.for_kind(kind));
                    self.spawn_abort(&key, transport, handle);
                }
            }
            return;
        }

        match result {
            Ok(handle) => {
                let transfer_id = handle.transfer_id();
                if let Some(entry) = self.active.get_mut(&key) {
                    entry.handle = Some(handle);
                }
                let part = self.find_part_mut(&key).map(|part| {
                    part.transfer_id = Some(transfer_id);
                    part.clone()
                });
                if let Some(part) = part {
                    self.emit_part(&part);
                }
            }
            Err(e) => {
                self.fail_part(&key, e);
                self.fill_slots();
                self.refresh_notification();
            }
        }
    }

    pub(crate) fn on_relocated(&mut self, key: PartKey, attempt: u32, result: Result<PathBuf>) {
        if !self.is_current(&key, attempt)
            || self.find_part(&key).map(|p| p.state) != Some(PartState::Moving)
        {
            tracing::debug!(part = %key, "Dropping stale relocation result");
            return;
        }

        match result {
            Ok(path) => {
                let part = self.find_part_mut(&key).and_then(|part| {
                    part.finish_move(path).ok()?;
                    Some(part.clone())
                });
                match part {
                    Some(part) => {
                        tracing::debug!(part = %key, path = ?part.final_path, "Part relocated");
                        self.emit_part(&part);
                        self.finish_part(&key);
                    }
                    None => self.fail_part(&key, Error::relocation("part left the moving state")),
                }
            }
            Err(e) => self.fail_part(&key, e),
        }

        self.fill_slots();
        self.refresh_notification();
    }

    fn apply_progress(&mut self, key: &PartKey, bytes: u64, total: Option<u64>, percent: u8) {
        let part = self.find_part_mut(key).and_then(|part| {
            part.record_progress(bytes, total, percent)
                .then(|| part.clone())
        });
        if let Some(part) = part {
            self.emit_part(&part);
        }
    }

    /// Bytes are in: direct parts are done, managed parts move on to relocation
    fn complete_part(&mut self, key: &PartKey, bytes: u64) {
        let part = self.find_part_mut(key).and_then(|part| {
            part.complete(bytes).ok()?;
            Some(part.clone())
        });
        let Some(part) = part else {
            return;
        };
        self.emit_part(&part);

        if part.transport.requires_relocation() {
            self.begin_relocation(key);
        } else {
            tracing::debug!(part = %key, bytes, "Part downloaded");
            self.finish_part(key);
        }
    }

    fn begin_relocation(&mut self, key: &PartKey) {
        let Some((transport, handle, attempt)) = self.active.get(key).map(|entry| {
            (
                Arc::clone(&entry.transport),
                entry.handle.clone(),
                entry.attempt,
            )
        }) else {
            return;
        };
        let Some(handle) = handle else {
            self.fail_part(key, Error::transfer("missing transfer id for relocation"));
            return;
        };

        let part = self.find_part_mut(key).and_then(|part| {
            part.begin_move().ok()?;
            Some(part.clone())
        });
        let Some(part) = part else {
            return;
        };
        self.emit_part(&part);

        let commands = self.commands.clone();
        let key = key.clone();
        let request = PartRequest::from(&part);
        tracing::debug!(part = %key, "Relocating staged file");

        tokio::spawn(async move {
            let result = transport.relocate(&request, &handle).await;
            deliver(
                &commands,
                Command::Relocated {
                    key,
                    attempt,
                    result,
                },
            )
            .ok();
        });
    }

    /// Release the slot of a part that reached a successful terminal state
    pub(crate) fn finish_part(&mut self, key: &PartKey) {
        self.active.remove(key);
        self.on_part_terminal(key);
    }

    /// Record a failure; the retry policy decides between re-queueing and `Failed`
    pub(crate) fn fail_part(&mut self, key: &PartKey, error: Error) {
        let retry = Arc::clone(&self.retry);
        let mut retry_at = None;

        let part = self.find_item_mut(&key.item_id).and_then(|queued| {
            let part = queued.item.parts.get_mut(key.index)?;
            let delay = retry.next_delay(&PartFailure {
                part: &*part,
                error: &error,
            });
            match delay.filter(|_| part.requeue_for_retry().is_ok()) {
                Some(delay) => {
                    queued.not_before.insert(key.index, Instant::now() + delay);
                    retry_at = Some(delay);
                }
                None => part.fail().ok()?,
            }
            Some(part.clone())
        });

        if let Some(entry) = self.active.remove(key)
            && let Some(handle) = entry.handle
        {
            self.spawn_abort(key, entry.transport, handle);
        }

        let Some(part) = part else {
            return;
        };
        self.emit_part(&part);

        match retry_at {
            Some(delay) => {
                tracing::warn!(
                    part = %key,
                    error = %error,
                    attempt = part.attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Part failed, retrying"
                );
            }
            None => {
                tracing::warn!(part = %key, error = %error, "Part failed");
                self.on_part_terminal(key);
            }
        }
    }
}
