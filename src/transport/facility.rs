//! Out-of-process download facility used by the managed transport.
//!
//! On a phone this is the system download manager: it owns the transfer,
//! writes into its own staging area, and only answers status queries.
//! [`HttpStagingFacility`] reproduces that contract in-process so the managed
//! path can run on any host.

use super::http::{remove_partial, stream_to_file};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Id assigned by the facility when a transfer is enqueued
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FacilityId(pub i64);

impl std::fmt::Display for FacilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to hand to the facility
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FacilityRequest {
    /// Source URL
    pub url: Url,
    /// File name in the staging area
    pub file_name: String,
    /// Title for the facility's own UI
    pub title: String,
}

/// Facility-side state of a transfer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FacilityState {
    /// Accepted, not started
    Pending,
    /// Bytes flowing
    Running,
    /// Held by the facility (network loss, storage pressure)
    Paused,
    /// All bytes staged
    Successful,
    /// Gave up
    Failed {
        /// Facility-supplied reason
        reason: String,
        /// Status the media server answered with, for HTTP errors
        http_status: Option<u16>,
    },
}

/// Answer to a status query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FacilityStatus {
    /// Current state
    pub state: FacilityState,
    /// Expected size, if known
    pub total_bytes: Option<u64>,
    /// Bytes staged so far
    pub bytes_so_far: u64,
    /// Staged file location
    pub local_path: PathBuf,
}

/// The download facility a [`ManagedTransport`](super::ManagedTransport) talks to
#[async_trait]
pub trait DownloadFacility: Send + Sync {
    /// Hand over a transfer
    async fn enqueue(&self, request: FacilityRequest) -> Result<FacilityId>;

    /// Status of a transfer; `None` if the facility does not know the id
    async fn query(&self, id: FacilityId) -> Result<Option<FacilityStatus>>;

    /// Cancel the transfer if running and delete anything it staged
    async fn remove(&self, id: FacilityId) -> Result<()>;
}

struct StagedTransfer {
    status: FacilityStatus,
    token: CancellationToken,
}

type Registry = Arc<Mutex<HashMap<FacilityId, StagedTransfer>>>;

/// [`DownloadFacility`] that downloads over HTTP into a staging directory
///
/// Each transfer lands in `staging_dir/<id>/<file_name>`.
pub struct HttpStagingFacility {
    client: reqwest::Client,
    staging_dir: PathBuf,
    next_id: AtomicI64,
    transfers: Registry,
}

impl HttpStagingFacility {
    /// Create a facility that stages under `staging_dir`
    pub fn with_client(client: reqwest::Client, staging_dir: PathBuf) -> Self {
        Self {
            client,
            staging_dir,
            next_id: AtomicI64::new(1),
            transfers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of transfers the facility still tracks
    pub fn tracked(&self) -> usize {
        lock(&self.transfers).len()
    }
}

// The registry holds plain data, so a poisoned lock is still consistent.
fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<FacilityId, StagedTransfer>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn update(registry: &Registry, id: FacilityId, f: impl FnOnce(&mut FacilityStatus)) {
    if let Some(entry) = lock(registry).get_mut(&id) {
        f(&mut entry.status);
    }
}

#[async_trait]
impl DownloadFacility for HttpStagingFacility {
    async fn enqueue(&self, request: FacilityRequest) -> Result<FacilityId> {
        let id = FacilityId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let local_path = self
            .staging_dir
            .join(id.0.to_string())
            .join(&request.file_name);
        let token = CancellationToken::new();

        lock(&self.transfers).insert(
            id,
            StagedTransfer {
                status: FacilityStatus {
                    state: FacilityState::Pending,
                    total_bytes: None,
                    bytes_so_far: 0,
                    local_path: local_path.clone(),
                },
                token: token.clone(),
            },
        );

        tracing::debug!(id = %id, title = %request.title, path = ?local_path, "Facility transfer enqueued");

        let client = self.client.clone();
        let registry = Arc::clone(&self.transfers);
        tokio::spawn(async move {
            update(&registry, id, |s| s.state = FacilityState::Running);

            let progress_registry = Arc::clone(&registry);
            let on_progress = move |written: u64, total: Option<u64>| {
                update(&progress_registry, id, |s| {
                    s.bytes_so_far = written;
                    s.total_bytes = total;
                });
            };

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = stream_to_file(&client, &request.url, &local_path, on_progress) => result,
            };

            match result {
                Ok(bytes) => update(&registry, id, |s| {
                    s.bytes_so_far = bytes;
                    s.state = FacilityState::Successful;
                }),
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "Facility transfer failed");
                    remove_partial(&local_path).await;
                    update(&registry, id, |s| {
                        s.state = FacilityState::Failed {
                            reason: e.to_string(),
                            http_status: e.http_status(),
                        }
                    });
                }
            }
        });

        Ok(id)
    }

    async fn query(&self, id: FacilityId) -> Result<Option<FacilityStatus>> {
        Ok(lock(&self.transfers).get(&id).map(|t| t.status.clone()))
    }

    async fn remove(&self, id: FacilityId) -> Result<()> {
        let Some(entry) = lock(&self.transfers).remove(&id) else {
            return Ok(());
        };
        entry.token.cancel();
        remove_partial(&entry.status.local_path).await;
        if let Some(dir) = entry.status.local_path.parent()
            && dir != self.staging_dir
        {
            tokio::fs::remove_dir(dir).await.ok();
        }
        tracing::debug!(id = %id, "Facility transfer removed");
        Ok(())
    }
}
