//! Event waiting helpers for integration tests

use shelf_dl::{CompletionPayload, DownloadCoordinator, Event, ItemId, SessionSummary};
use std::time::Duration;
use tokio::sync::broadcast;

/// Result of waiting for an item to finish
#[derive(Debug)]
pub enum WaitResult {
    /// Item finished (check `failed_parts` for the outcome)
    Finished(CompletionPayload),
    /// Timeout waiting for completion
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for `ItemComplete` for `id` on an existing subscription
pub async fn wait_for_item(
    events: &mut broadcast::Receiver<Event>,
    id: &ItemId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::ItemComplete(payload)) if &payload.item_id == id => {
                    return WaitResult::Finished(payload);
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Wait for the session summary on an existing subscription
pub async fn wait_for_summary(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
) -> Option<SessionSummary> {
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Summary(summary)) => return Some(summary),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Poll snapshots until the queue is empty
pub async fn wait_for_empty_queue(coordinator: &DownloadCoordinator, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, async {
        loop {
            match coordinator.snapshot().await {
                Ok(snapshot) if snapshot.items.is_empty() => return true,
                Ok(_) => tokio::time::sleep(Duration::from_millis(10)).await,
                Err(_) => return false,
            }
        }
    })
    .await
    .unwrap_or(false)
}

/// Assert that a file exists with exactly `expected` as its contents
pub async fn assert_file_contents(path: &std::path::Path, expected: &[u8]) {
    let actual = tokio::fs::read(path)
        .await
        .unwrap_or_else(|e| panic!("Expected file at {}: {}", path.display(), e));
    assert_eq!(actual, expected, "Contents of {} differ", path.display());
}
