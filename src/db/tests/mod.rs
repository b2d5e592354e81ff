
use crate::types::{DownloadItem, FolderRef, TransportKind};
use url::Url;

/// Build a queued item with `parts` managed parts
pub(super) fn sample_item(id: &str, parts: usize) -> DownloadItem {
    let folder = FolderRef::new("fold_1", "/books");
    let mut item = DownloadItem::new(id, format!("Title {}", id), folder);
    for index in 0..parts {
        item = item.with_part(
            Url::parse(&format!("https://abs.example/{}/{}.mp3", id, index)).unwrap(),
            format!("{}.mp3", index),
            TransportKind::Managed,
        );
    }
    item
}
