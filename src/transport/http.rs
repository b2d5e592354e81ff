//! Shared HTTP streaming used by the direct transport and the staging facility.

use crate::config::TransportConfig;
use crate::error::{Error, Result};
use futures::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use url::Url;

pub(crate) fn build_client(config: &TransportConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(config.connect_timeout)
        .build()?;
    Ok(client)
}

/// Stream `url` into `path`, calling `on_progress(bytes_written, total_bytes)` per chunk.
///
/// Returns the number of bytes written. The caller owns cleanup of a partial
/// file on error or cancellation.
pub(crate) async fn stream_to_file<F>(
    client: &reqwest::Client,
    url: &Url,
    path: &Path,
    mut on_progress: F,
) -> Result<u64>
where
    F: FnMut(u64, Option<u64>) + Send,
{
    let response = client.get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let total_bytes = response.content_length();

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(path).await?;

    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        on_progress(written, total_bytes);
    }
    file.flush().await?;

    if let Some(expected) = total_bytes
        && written < expected
    {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("stream ended after {} of {} bytes", written, expected),
        )));
    }

    Ok(written)
}

/// Remove a partially written file, ignoring a file that is already gone
pub(crate) async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = ?path, error = %e, "Failed to remove partial file");
    }
}
