//! Managed transport: delegate to a [`DownloadFacility`], poll, then relocate.

use super::facility::{DownloadFacility, FacilityRequest, FacilityState};
use super::{PartReporter, PartRequest, PollStatus, TransferHandle, Transport};
use crate::error::{Error, Result};
use crate::storage::StorageMover;
use crate::types::TransportKind;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Extensions the storage layer may wrongly suffix with `.mp3`
const DOUBLED_EXTENSIONS: [&str; 2] = [".m4b.mp3", ".m4a.mp3"];

/// Name a relocated file should have if the storage layer appended a bogus
/// `.mp3` to an `.m4b`/`.m4a` file
///
/// ```
/// use shelf_dl::transport::corrected_file_name;
///
/// assert_eq!(corrected_file_name("book.m4b.mp3").as_deref(), Some("book.m4b"));
/// assert_eq!(corrected_file_name("Track.M4A.MP3").as_deref(), Some("Track.M4A"));
/// assert_eq!(corrected_file_name("track.mp3"), None);
/// ```
pub fn corrected_file_name(name: &str) -> Option<String> {
    let lower = name.to_ascii_lowercase();
    DOUBLED_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(ext))
        .then(|| name[..name.len() - ".mp3".len()].to_string())
}

/// Transport for parts handed to an out-of-process download facility
///
/// The watcher polls it for progress. Once the facility reports success the
/// coordinator calls [`Transport::relocate`], which moves the staged file into
/// the item's folder and repairs a doubled extension.
pub struct ManagedTransport {
    facility: Arc<dyn DownloadFacility>,
    storage: Arc<dyn StorageMover>,
}

impl ManagedTransport {
    /// Create a managed transport
    pub fn new(facility: Arc<dyn DownloadFacility>, storage: Arc<dyn StorageMover>) -> Self {
        Self { facility, storage }
    }
}

fn facility_id(handle: &TransferHandle) -> Result<super::FacilityId> {
    match handle {
        TransferHandle::Facility(id) => Ok(*id),
        TransferHandle::Stream { .. } => Err(Error::transfer(
            "managed transport got a stream handle",
        )),
    }
}

#[async_trait]
impl Transport for ManagedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Managed
    }

    async fn start(&self, request: &PartRequest, _reporter: PartReporter) -> Result<TransferHandle> {
        let id = self
            .facility
            .enqueue(FacilityRequest {
                url: request.source_url.clone(),
                file_name: request.filename.clone(),
                title: request.key.to_string(),
            })
            .await?;
        tracing::debug!(part = %request.key, id = %id, "Handed part to download facility");
        Ok(TransferHandle::Facility(id))
    }

    async fn poll(&self, handle: &TransferHandle) -> Result<PollStatus> {
        let id = facility_id(handle)?;
        let status = self
            .facility
            .query(id)
            .await?
            .ok_or_else(|| Error::transfer(format!("unknown transfer id {}", id)))?;

        Ok(match status.state {
            FacilityState::Pending | FacilityState::Running | FacilityState::Paused => {
                PollStatus::Progress {
                    bytes_so_far: status.bytes_so_far,
                    total_bytes: status.total_bytes,
                }
            }
            FacilityState::Successful => PollStatus::Completed {
                bytes: status.bytes_so_far,
            },
            FacilityState::Failed {
                reason,
                http_status,
            } => PollStatus::Failed {
                reason,
                http_status,
            },
        })
    }

    async fn relocate(&self, request: &PartRequest, handle: &TransferHandle) -> Result<PathBuf> {
        let id = facility_id(handle)?;
        let status = self
            .facility
            .query(id)
            .await?
            .ok_or_else(|| Error::relocation(format!("staged file for {} is gone", id)))?;

        let moved = self
            .storage
            .move_file(&status.local_path, &request.destination_dir, &request.filename)
            .await?;

        let moved_name = moved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let final_path = match corrected_file_name(&moved_name) {
            Some(fixed) => {
                tracing::info!(part = %request.key, from = %moved_name, to = %fixed, "Correcting doubled extension");
                self.storage.rename(&moved, &fixed).await?
            }
            None => moved,
        };

        if let Err(e) = self.facility.remove(id).await {
            tracing::debug!(part = %request.key, error = %e, "Facility cleanup after relocation failed");
        }

        Ok(final_path)
    }

    async fn abort(&self, handle: &TransferHandle) -> Result<()> {
        self.facility.remove(facility_id(handle)?).await
    }
}
