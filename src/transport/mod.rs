//! Transfer strategies
//!
//! A part is moved by one of two [`Transport`] implementations, chosen by the
//! part's [`TransportKind`] when it is dispatched:
//!
//! - [`DirectTransport`] streams bytes straight into the final file and pushes
//!   progress and completion through a [`PartReporter`]
//! - [`ManagedTransport`] hands the transfer to a [`DownloadFacility`], is
//!   polled by the progress watcher, and relocates the staged file afterwards
//!
//! The coordinator never branches on the kind beyond picking the transport
//! from a [`TransportSet`].

mod direct;
mod facility;
mod http;
mod managed;

pub use direct::DirectTransport;
pub use facility::{
    DownloadFacility, FacilityId, FacilityRequest, FacilityState, FacilityStatus,
    HttpStagingFacility,
};
pub use managed::{ManagedTransport, corrected_file_name};

use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::storage::StorageMover;
use crate::types::{DownloadItemPart, PartKey, TransportKind};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Everything a transport needs to know about a part
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartRequest {
    /// Part address
    pub key: PartKey,
    /// Where to fetch from
    pub source_url: Url,
    /// Destination file name
    pub filename: String,
    /// Destination folder
    pub destination_dir: PathBuf,
}

impl PartRequest {
    /// Final path of the file
    pub fn destination_path(&self) -> PathBuf {
        self.destination_dir.join(&self.filename)
    }
}

impl From<&DownloadItemPart> for PartRequest {
    fn from(part: &DownloadItemPart) -> Self {
        Self {
            key: part.key(),
            source_url: part.source_url.clone(),
            filename: part.filename.clone(),
            destination_dir: part.destination_dir.clone(),
        }
    }
}

/// Handle to a live transfer, returned by [`Transport::start`]
#[derive(Clone, Debug)]
pub enum TransferHandle {
    /// In-process stream writing to `path`
    Stream {
        /// Cancels the stream task
        token: CancellationToken,
        /// File being written
        path: PathBuf,
    },
    /// Transfer owned by a [`DownloadFacility`]
    Facility(FacilityId),
}

impl TransferHandle {
    /// Identifier shown in part updates
    pub fn transfer_id(&self) -> String {
        match self {
            TransferHandle::Stream { path, .. } => format!("stream:{}", path.display()),
            TransferHandle::Facility(id) => format!("facility:{}", id),
        }
    }
}

/// Result of polling a managed transfer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollStatus {
    /// Still transferring
    Progress {
        /// Bytes received so far
        bytes_so_far: u64,
        /// Expected size, when known
        total_bytes: Option<u64>,
    },
    /// Bytes are staged and ready for relocation
    Completed {
        /// Final byte count
        bytes: u64,
    },
    /// The facility gave up on the transfer
    Failed {
        /// Facility-supplied reason
        reason: String,
        /// Status the media server answered with, for HTTP errors
        http_status: Option<u16>,
    },
}

/// Push-style report from a transport that does not get polled
#[derive(Debug)]
pub enum TransferSignal {
    /// More bytes were written
    Progress {
        /// Total bytes written so far
        bytes_written: u64,
        /// Expected size, when known
        total_bytes: Option<u64>,
        /// Percent complete
        percent: u8,
    },
    /// The stream ended and the file is complete
    Completed {
        /// Total bytes written
        bytes_written: u64,
    },
    /// The stream failed
    Failed(Error),
}

/// A [`TransferSignal`] addressed to one attempt of one part
#[derive(Debug)]
pub struct PartSignal {
    /// Part the signal belongs to
    pub key: PartKey,
    /// Attempt number the transport was started for
    pub attempt: u32,
    /// The report
    pub signal: TransferSignal,
}

/// Sink transports use to report progress into the coordinator
///
/// Reports are delivered to the coordinator's single execution context;
/// a transport may call these from any task or thread. Reports for a
/// coordinator that is gone are dropped.
#[derive(Clone, Debug)]
pub struct PartReporter {
    key: PartKey,
    attempt: u32,
    tx: mpsc::UnboundedSender<PartSignal>,
}

impl PartReporter {
    /// Create a reporter for `key` that sends into `tx`
    pub fn new(key: PartKey, attempt: u32, tx: mpsc::UnboundedSender<PartSignal>) -> Self {
        Self { key, attempt, tx }
    }

    /// The part being reported on
    pub fn key(&self) -> &PartKey {
        &self.key
    }

    /// Report bytes written and percent
    pub fn progress(&self, bytes_written: u64, total_bytes: Option<u64>, percent: u8) {
        self.send(TransferSignal::Progress {
            bytes_written,
            total_bytes,
            percent,
        });
    }

    /// Report a finished stream
    pub fn completed(&self, bytes_written: u64) {
        self.send(TransferSignal::Completed { bytes_written });
    }

    /// Report a failed stream
    pub fn failed(&self, error: Error) {
        self.send(TransferSignal::Failed(error));
    }

    fn send(&self, signal: TransferSignal) {
        self.tx
            .send(PartSignal {
                key: self.key.clone(),
                attempt: self.attempt,
                signal,
            })
            .ok();
    }
}

/// One transfer strategy
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which parts this transport serves
    fn kind(&self) -> TransportKind;

    /// Begin transferring `request`
    ///
    /// Push-style transports keep `reporter` and report through it; polled
    /// transports may drop it.
    async fn start(&self, request: &PartRequest, reporter: PartReporter) -> Result<TransferHandle>;

    /// Status of a polled transfer
    async fn poll(&self, handle: &TransferHandle) -> Result<PollStatus> {
        let _ = handle;
        Err(Error::NotSupported(format!(
            "{:?} transport is not polled",
            self.kind()
        )))
    }

    /// Move a completed transfer into its final folder; returns the final path
    async fn relocate(&self, request: &PartRequest, handle: &TransferHandle) -> Result<PathBuf> {
        let _ = (request, handle);
        Err(Error::NotSupported(format!(
            "{:?} transport does not relocate",
            self.kind()
        )))
    }

    /// Stop a transfer and clean up after it (best-effort)
    async fn abort(&self, handle: &TransferHandle) -> Result<()>;
}

/// The two transports, selected per part by [`TransportKind`]
#[derive(Clone)]
pub struct TransportSet {
    direct: Arc<dyn Transport>,
    managed: Arc<dyn Transport>,
}

impl TransportSet {
    /// Combine a direct and a managed transport
    pub fn new(direct: Arc<dyn Transport>, managed: Arc<dyn Transport>) -> Self {
        Self { direct, managed }
    }

    /// HTTP transports: streaming direct transfers plus a staging facility for managed ones
    pub fn http(config: &TransportConfig, storage: Arc<dyn StorageMover>) -> Result<Self> {
        let client = http::build_client(config)?;
        let facility = Arc::new(HttpStagingFacility::with_client(
            client.clone(),
            config.staging_dir.clone(),
        ));
        Ok(Self::new(
            Arc::new(DirectTransport::with_client(client)),
            Arc::new(ManagedTransport::new(facility, storage)),
        ))
    }

    /// The transport serving `kind`
    pub fn for_kind(&self, kind: TransportKind) -> &Arc<dyn Transport> {
        match kind {
            TransportKind::Direct => &self.direct,
            TransportKind::Managed => &self.managed,
        }
    }
}
