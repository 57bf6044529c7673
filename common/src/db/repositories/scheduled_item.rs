// Scheduled item repository implementation

use super::queries::scheduled_item_queries;
use crate::db::DbPool;
use crate::errors::StoreError;
use crate::models::{Attachment, ItemStatus, ScheduledItem};
use crate::store::ItemStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

/// PostgreSQL-backed item store
pub struct ScheduledItemRepository {
    pool: DbPool,
}

impl ScheduledItemRepository {
    /// Create a new ScheduledItemRepository
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the scheduled_items table and its index if missing
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(scheduled_item_queries::CREATE_TABLE)
            .execute(self.pool.pool())
            .await?;
        sqlx::query(scheduled_item_queries::CREATE_STATUS_INDEX)
            .execute(self.pool.pool())
            .await?;

        tracing::info!("scheduled_items schema ready");
        Ok(())
    }

    /// Find a single item by id
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ScheduledItem>, StoreError> {
        let query = format!(
            "SELECT {} FROM scheduled_items WHERE id = $1",
            scheduled_item_queries::SELECT_ALL_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        row.map(|r| item_from_row(&r)).transpose()
    }
}

fn item_from_row(row: &PgRow) -> Result<ScheduledItem, StoreError> {
    let fire_time: String = row.try_get("fire_time")?;
    let status: String = row.try_get("status")?;
    let attachments: serde_json::Value = row.try_get("attachments")?;
    let attachments: Vec<Attachment> = serde_json::from_value(attachments)?;

    Ok(ScheduledItem {
        id: row.try_get("id")?,
        recipient: row.try_get("recipient")?,
        subject: row.try_get("subject")?,
        body: row.try_get("body")?,
        fire_date: row.try_get("fire_date")?,
        fire_time: fire_time.parse().map_err(|e: String| {
            StoreError::QueryFailed(format!("Failed to parse fire_time: {}", e))
        })?,
        category: row.try_get("category")?,
        attachments,
        status: status.parse().map_err(StoreError::QueryFailed)?,
        created_at: row.try_get("created_at")?,
        sent_at: row.try_get("sent_at")?,
    })
}

#[async_trait]
impl ItemStore for ScheduledItemRepository {
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    async fn insert(&self, item: &ScheduledItem) -> Result<(), StoreError> {
        let attachments = serde_json::to_value(&item.attachments)?;

        sqlx::query(
            r#"
            INSERT INTO scheduled_items (
                id, recipient, subject, body, fire_date, fire_time,
                category, attachments, status, created_at, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(item.id)
        .bind(&item.recipient)
        .bind(&item.subject)
        .bind(&item.body)
        .bind(item.fire_date)
        .bind(item.fire_time.to_string())
        .bind(&item.category)
        .bind(attachments)
        .bind(item.status.as_str())
        .bind(item.created_at)
        .bind(item.sent_at)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(item_id = %item.id, fire_date = %item.fire_date, fire_time = %item.fire_time, "Scheduled item stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_pending(&self) -> Result<Vec<ScheduledItem>, StoreError> {
        let query = format!(
            "SELECT {} FROM scheduled_items WHERE status = 'pending' ORDER BY fire_date, fire_time, created_at",
            scheduled_item_queries::SELECT_ALL_COLUMNS
        );
        let rows = sqlx::query(&query).fetch_all(self.pool.pool()).await?;

        let items = rows
            .iter()
            .map(item_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(count = items.len(), "Loaded pending items");
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        id: Uuid,
        status: ItemStatus,
        sent_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::QueryFailed(format!(
                "Refusing to move item {} back to {}",
                id, status
            )));
        }

        // The status guard keeps a terminal record from ever changing again
        let result = sqlx::query(
            r#"
            UPDATE scheduled_items
            SET status = $2,
                sent_at = $3
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(sent_at)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }

        tracing::debug!(item_id = %id, status = %status, "Item status updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(scheduled_item_queries::DELETE_PENDING)
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }

        tracing::info!(item_id = %id, "Scheduled item deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<ScheduledItem>, StoreError> {
        let query = format!(
            "SELECT {} FROM scheduled_items ORDER BY fire_date, fire_time, created_at",
            scheduled_item_queries::SELECT_ALL_COLUMNS
        );
        let rows = sqlx::query(&query).fetch_all(self.pool.pool()).await?;

        rows.iter().map(item_from_row).collect()
    }
}
