//! Direct transport: stream bytes straight into the final file.

use super::http::{build_client, remove_partial, stream_to_file};
use super::{PartReporter, PartRequest, TransferHandle, Transport};
use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::tracker::percent_of;
use crate::types::TransportKind;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Minimum bytes between progress reports when the percentage does not move
const PROGRESS_BYTE_STEP: u64 = 512 * 1024;

/// Streams each part over HTTP into its destination path
///
/// There is no relocation step; the file is final when the stream ends.
pub struct DirectTransport {
    client: reqwest::Client,
}

impl DirectTransport {
    /// Create a transport with its own HTTP client
    pub fn new(config: &TransportConfig) -> Result<Self> {
        Ok(Self::with_client(build_client(config)?))
    }

    /// Create a transport sharing an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for DirectTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Direct
    }

    async fn start(&self, request: &PartRequest, reporter: PartReporter) -> Result<TransferHandle> {
        let token = CancellationToken::new();
        let path = request.destination_path();

        tokio::spawn(run_stream(
            self.client.clone(),
            request.source_url.clone(),
            path.clone(),
            token.clone(),
            reporter,
        ));

        Ok(TransferHandle::Stream { token, path })
    }

    async fn abort(&self, handle: &TransferHandle) -> Result<()> {
        match handle {
            TransferHandle::Stream { token, .. } => {
                token.cancel();
                Ok(())
            }
            TransferHandle::Facility(id) => Err(Error::transfer(format!(
                "direct transport cannot abort facility transfer {}",
                id
            ))),
        }
    }
}

async fn run_stream(
    client: reqwest::Client,
    url: Url,
    path: PathBuf,
    token: CancellationToken,
    reporter: PartReporter,
) {
    let progress = reporter.clone();
    let mut last_percent: Option<u8> = None;
    let mut last_bytes: u64 = 0;
    let on_progress = move |written: u64, total: Option<u64>| {
        let percent = percent_of(written, total);
        if last_percent != Some(percent) || written - last_bytes >= PROGRESS_BYTE_STEP {
            last_percent = Some(percent);
            last_bytes = written;
            progress.progress(written, total, percent);
        }
    };

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => {
            tracing::debug!(part = %reporter.key(), "Direct transfer aborted");
            remove_partial(&path).await;
            return;
        }
        result = stream_to_file(&client, &url, &path, on_progress) => result,
    };

    match result {
        Ok(bytes) => {
            tracing::debug!(part = %reporter.key(), bytes, "Direct transfer finished");
            reporter.completed(bytes);
        }
        Err(e) => {
            tracing::warn!(part = %reporter.key(), error = %e, "Direct transfer failed");
            remove_partial(&path).await;
            reporter.failed(e);
        }
    }
}
