//! HTTP fixtures, item builders and storage doubles

use async_trait::async_trait;
use shelf_dl::storage::{FsStorageMover, StorageMover};
use shelf_dl::{DownloadItem, FolderRef, TransportKind};
use std::path::{Path, PathBuf};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fake audio payload; big enough to arrive in more than one chunk
pub fn audio_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Serve `body` at `route` with a 200
pub async fn serve_file(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

/// Answer `route` with `status` and no body
pub async fn serve_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Serve `body` at `route` after `delay`
pub async fn serve_slow_file(
    server: &MockServer,
    route: &str,
    body: Vec<u8>,
    delay: std::time::Duration,
) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body)
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Item downloading into `folder`, one part per `(route, filename, kind)`
pub fn item_from_server(
    server: &MockServer,
    id: &str,
    folder: &Path,
    parts: &[(&str, &str, TransportKind)],
) -> DownloadItem {
    let folder_ref = FolderRef::new(format!("fold_{}", id), folder);
    let mut item = DownloadItem::new(id, format!("Book {}", id), folder_ref);
    for (route, filename, kind) in parts {
        let url = Url::parse(&format!("{}{}", server.uri(), route)).expect("valid mock URL");
        item = item.with_part(url, *filename, *kind);
    }
    item
}

/// File-system mover that appends `.mp3` to every moved file, the way a
/// MIME-driven storage layer names audio files
pub struct MimeSuffixMover {
    inner: FsStorageMover,
}

impl MimeSuffixMover {
    pub fn new() -> Self {
        Self {
            inner: FsStorageMover,
        }
    }
}

#[async_trait]
impl StorageMover for MimeSuffixMover {
    async fn move_file(
        &self,
        source: &Path,
        dest_folder: &Path,
        dest_name: &str,
    ) -> shelf_dl::Result<PathBuf> {
        self.inner
            .move_file(source, dest_folder, &format!("{}.mp3", dest_name))
            .await
    }

    async fn rename(&self, path: &Path, new_name: &str) -> shelf_dl::Result<PathBuf> {
        self.inner.rename(path, new_name).await
    }
}
