//! Post-processing hook run once per finished item
//!
//! After every part of an item is terminal, the coordinator hands the item to
//! a [`LibraryScanner`] (typically the host's local library scan) and puts the
//! returned value into the item's [`CompletionPayload`](crate::types::CompletionPayload).

use crate::types::DownloadItem;
use async_trait::async_trait;

/// Opaque library-item payload produced by a scan (`None` when nothing was found)
pub type ScanResult = Option<serde_json::Value>;

/// Scans a finished item into the local library
///
/// Scanning never fails from the coordinator's point of view: implementations
/// report problems by returning `None` and logging.
#[async_trait]
pub trait LibraryScanner: Send + Sync {
    /// Scan the downloaded files of `item`
    async fn scan(&self, item: &DownloadItem) -> ScanResult;
}

/// Scanner used when the host has no library to update
///
/// # Examples
///
/// ```
/// use shelf_dl::post_processing::{LibraryScanner, NoOpLibraryScanner};
/// use shelf_dl::types::{DownloadItem, FolderRef};
///
/// # #[tokio::main]
/// # async fn main() {
/// let item = DownloadItem::new("li_1", "Dune", FolderRef::new("f", "/books"));
/// assert!(NoOpLibraryScanner.scan(&item).await.is_none());
/// # }
/// ```
pub struct NoOpLibraryScanner;

#[async_trait]
impl LibraryScanner for NoOpLibraryScanner {
    async fn scan(&self, item: &DownloadItem) -> ScanResult {
        tracing::debug!(item_id = %item.id, "No library scanner configured, skipping scan");
        None
    }
}
