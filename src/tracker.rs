//! Per-part state machine and progress counters.
//!
//! Every transition a part can take lives here, so the coordinator never
//! assigns `state` directly. Guards:
//! - `Pending` is only left through [`DownloadItemPart::start`]
//! - `Moving` is only entered from `Completed` on a managed transport
//! - terminal states (`Moved`, direct `Completed`, `Failed`) are final

use crate::types::{DownloadItemPart, PartState, TransportKind};
use std::path::PathBuf;
use thiserror::Error;

/// A transition the state machine does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid part transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    /// State the part was in
    pub from: PartState,
    /// State that was requested
    pub to: PartState,
}

type Transition = std::result::Result<(), InvalidTransition>;

impl DownloadItemPart {
    /// Whether the part has left the slot set for good
    pub fn is_terminal(&self) -> bool {
        match self.state {
            PartState::Moved | PartState::Failed => true,
            PartState::Completed => self.transport == TransportKind::Direct,
            PartState::Pending | PartState::Downloading | PartState::Moving => false,
        }
    }

    /// Whether the progress watcher should poll this part on the next tick
    pub fn is_pollable(&self) -> bool {
        self.transport.is_polled() && self.state == PartState::Downloading
    }

    /// `Pending -> Downloading`
    pub fn start(&mut self) -> Transition {
        self.guard(PartState::Pending, PartState::Downloading)?;
        self.state = PartState::Downloading;
        Ok(())
    }

    /// Apply a progress report; returns whether anything visible changed.
    ///
    /// Percent and byte counters only move forward.
    pub fn record_progress(&mut self, bytes: u64, total_bytes: Option<u64>, percent: u8) -> bool {
        if self.state != PartState::Downloading {
            return false;
        }
        let percent = percent.min(100).max(self.progress_percent);
        let bytes = bytes.max(self.bytes_downloaded);
        let total_bytes = total_bytes.or(self.total_bytes);
        let changed = percent != self.progress_percent
            || bytes != self.bytes_downloaded
            || total_bytes != self.total_bytes;
        self.progress_percent = percent;
        self.bytes_downloaded = bytes;
        self.total_bytes = total_bytes;
        changed
    }

    /// `Downloading -> Completed`
    ///
    /// For a direct part this is terminal and the destination is final.
    pub fn complete(&mut self, bytes: u64) -> Transition {
        self.guard(PartState::Downloading, PartState::Completed)?;
        self.state = PartState::Completed;
        self.progress_percent = 100;
        self.bytes_downloaded = bytes.max(self.bytes_downloaded);
        if self.transport == TransportKind::Direct {
            self.final_path = Some(self.destination_path());
        }
        Ok(())
    }

    /// `Completed -> Moving` (managed only)
    pub fn begin_move(&mut self) -> Transition {
        if !self.transport.requires_relocation() {
            return Err(InvalidTransition {
                from: self.state,
                to: PartState::Moving,
            });
        }
        self.guard(PartState::Completed, PartState::Moving)?;
        self.state = PartState::Moving;
        Ok(())
    }

    /// `Moving -> Moved`
    pub fn finish_move(&mut self, final_path: PathBuf) -> Transition {
        self.guard(PartState::Moving, PartState::Moved)?;
        self.state = PartState::Moved;
        self.final_path = Some(final_path);
        self.transfer_id = None;
        Ok(())
    }

    /// Any non-terminal state `-> Failed`
    pub fn fail(&mut self) -> Transition {
        if self.is_terminal() {
            return Err(InvalidTransition {
                from: self.state,
                to: PartState::Failed,
            });
        }
        self.state = PartState::Failed;
        self.failed = true;
        self.transfer_id = None;
        Ok(())
    }

    /// Put a live, non-terminal part back in line for another attempt
    pub fn requeue_for_retry(&mut self) -> Transition {
        if self.is_terminal() || self.state == PartState::Pending {
            return Err(InvalidTransition {
                from: self.state,
                to: PartState::Pending,
            });
        }
        self.state = PartState::Pending;
        self.attempts += 1;
        self.progress_percent = 0;
        self.bytes_downloaded = 0;
        self.transfer_id = None;
        Ok(())
    }

    /// Forget all runtime state; used when a persisted item is restored
    pub(crate) fn reset(&mut self) {
        self.state = PartState::Pending;
        self.failed = false;
        self.attempts = 0;
        self.progress_percent = 0;
        self.bytes_downloaded = 0;
        self.total_bytes = None;
        self.transfer_id = None;
        self.final_path = None;
    }

    fn guard(&self, from: PartState, to: PartState) -> Transition {
        if self.state == from {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.state,
                to,
            })
        }
    }
}

/// Percent for `bytes` out of `total`, clamped to 0..=100
pub fn percent_of(bytes: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => ((bytes.saturating_mul(100) / total).min(100)) as u8,
        _ => 0,
    }
}
