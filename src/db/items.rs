//! Queued item CRUD operations.

use crate::error::DatabaseError;
use crate::types::{DownloadItem, ItemId};
use crate::{Error, Result};
use async_trait::async_trait;

use super::{Database, QueueStore};

impl Database {
    /// Number of stored items
    pub async fn count_items(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queued_items")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count queued items: {}",
                    e
                )))
            })?;
        Ok(count)
    }
}

#[async_trait]
impl QueueStore for Database {
    async fn save_item(&self, item: &DownloadItem) -> Result<()> {
        let payload = serde_json::to_string(item)?;
        let now = chrono::Utc::now().timestamp();

        // Re-saving an item keeps its original position in the queue
        sqlx::query(
            r#"
            INSERT INTO queued_items (id, payload, created_at, seq)
            VALUES (?, ?, ?, COALESCE((SELECT MAX(seq) FROM queued_items), 0) + 1)
            ON CONFLICT(id) DO UPDATE SET payload = excluded.payload
            "#,
        )
        .bind(item.id.as_str())
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to save item {}: {}",
                item.id, e
            )))
        })?;

        Ok(())
    }

    async fn remove_item(&self, id: &ItemId) -> Result<()> {
        sqlx::query("DELETE FROM queued_items WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to remove item {}: {}",
                    id, e
                )))
            })?;

        Ok(())
    }

    async fn load_items(&self) -> Result<Vec<DownloadItem>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, payload FROM queued_items ORDER BY seq ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to load queued items: {}",
                        e
                    )))
                })?;

        let mut items = Vec::with_capacity(rows.len());
        for (id, payload) in rows {
            match serde_json::from_str::<DownloadItem>(&payload) {
                Ok(item) => items.push(item),
                Err(e) => {
                    // One unreadable row must not block the rest of the queue
                    let error = DatabaseError::CorruptRow {
                        id: id.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!(item_id = %id, error = %error, "Skipping unreadable queued item");
                }
            }
        }

        Ok(items)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM queued_items")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear queued items: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
