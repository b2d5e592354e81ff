//! Durable queue persistence
//!
//! The coordinator only needs a simple key-value store of queued items, so the
//! seam is the [`QueueStore`] trait. Two implementations ship with the crate:
//! - [`Database`] - SQLite via sqlx, survives process restarts
//! - [`MemoryQueueStore`] - in-process map, for tests and hosts without durability
//!
//! ## Submodules
//!
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`items`] - Queued item CRUD

use crate::Result;
use crate::types::{DownloadItem, ItemId};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use tokio::sync::Mutex;

mod items;
mod migrations;

/// Key-value persistence for queued items
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert or replace an item
    async fn save_item(&self, item: &DownloadItem) -> Result<()>;

    /// Remove an item; removing an unknown id is not an error
    async fn remove_item(&self, id: &ItemId) -> Result<()>;

    /// All stored items in the order they were first saved
    async fn load_items(&self) -> Result<Vec<DownloadItem>>;

    /// Remove every item
    async fn clear(&self) -> Result<()>;
}

/// SQLite-backed [`QueueStore`]
pub struct Database {
    pool: SqlitePool,
}

/// In-memory [`QueueStore`]; contents are lost with the process
#[derive(Default)]
pub struct MemoryQueueStore {
    items: Mutex<Vec<DownloadItem>>,
}

impl MemoryQueueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn save_item(&self, item: &DownloadItem) -> Result<()> {
        let mut items = self.items.lock().await;
        match items.iter_mut().find(|stored| stored.id == item.id) {
            Some(stored) => *stored = item.clone(),
            None => items.push(item.clone()),
        }
        Ok(())
    }

    async fn remove_item(&self, id: &ItemId) -> Result<()> {
        self.items.lock().await.retain(|stored| &stored.id != id);
        Ok(())
    }

    async fn load_items(&self) -> Result<Vec<DownloadItem>> {
        Ok(self.items.lock().await.clone())
    }

    async fn clear(&self) -> Result<()> {
        self.items.lock().await.clear();
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
