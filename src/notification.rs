//! Notification text projected from coordinator state.
//!
//! Pure functions; the coordinator calls them after every change and forwards
//! the result to the [`BackgroundHost`](crate::host::BackgroundHost) and the
//! event stream when it differs from the previous one.

use crate::types::{DownloadItem, Notification, SessionSummary};

/// Overall progress of an item
///
/// `(terminal_parts * 100 + Σ progress of the other parts) / total_parts`,
/// clamped to 0..=100. An item without parts counts as done.
pub fn aggregate_progress(item: &DownloadItem) -> u8 {
    if item.parts.is_empty() {
        return 100;
    }
    let sum: u64 = item
        .parts
        .iter()
        .map(|part| {
            if part.is_terminal() {
                100
            } else {
                u64::from(part.progress_percent.min(100))
            }
        })
        .sum();
    (sum / item.parts.len() as u64).min(100) as u8
}

/// Notification for the head of the queue, or `None` if the queue is empty
///
/// ```
/// use shelf_dl::notification::project;
/// use shelf_dl::types::{DownloadItem, FolderRef};
///
/// let queue = vec![
///     DownloadItem::new("li_1", "Dune", FolderRef::new("f", "/books")),
///     DownloadItem::new("li_2", "Emma", FolderRef::new("f", "/books")),
/// ];
/// let notification = project(&queue).unwrap();
/// assert_eq!(notification.content, "Downloading Dune (+1 queued)");
/// ```
pub fn project<'a, I>(queue: I) -> Option<Notification>
where
    I: IntoIterator<Item = &'a DownloadItem>,
{
    let mut items = queue.into_iter();
    let head = items.next()?;
    let waiting = items.count();

    let content = if waiting == 0 {
        format!("Downloading {}", head.title)
    } else {
        format!("Downloading {} (+{} queued)", head.title, waiting)
    };

    Some(Notification {
        content,
        percent: aggregate_progress(head),
    })
}

/// Text shown once the queue drains
pub fn summary_text(summary: &SessionSummary) -> String {
    match summary {
        SessionSummary::Single {
            title,
            success: true,
        } => format!("{} downloaded", title),
        SessionSummary::Single {
            title,
            success: false,
        } => format!("{} failed to download", title),
        SessionSummary::Multiple { completed, failed } => {
            format!("{} completed, {} failed", completed, failed)
        }
    }
}

/// Final notification for a drained queue
pub fn summary_notification(summary: &SessionSummary) -> Notification {
    Notification {
        content: summary_text(summary),
        percent: 100,
    }
}
