// Item store contract consumed by the dispatch engine

pub mod memory;

pub use memory::MemoryItemStore;

use crate::errors::StoreError;
use crate::models::{ItemStatus, ScheduledItem};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Durable collection of scheduled items keyed by id
///
/// Implementations report an unreachable backend as `StoreError::Unavailable`
/// so callers can degrade instead of failing.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Persist a new item
    async fn insert(&self, item: &ScheduledItem) -> Result<(), StoreError>;

    /// All items still waiting to be sent
    async fn find_pending(&self) -> Result<Vec<ScheduledItem>, StoreError>;

    /// Move a pending item to a terminal status
    ///
    /// Only pending records are touched; an unknown or already terminal id
    /// yields `StoreError::NotFound`.
    async fn update_status(
        &self,
        id: Uuid,
        status: ItemStatus,
        sent_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Remove a pending item
    ///
    /// Sent and failed records are kept; deleting one yields
    /// `StoreError::NotFound`.
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Every item regardless of status, ordered by fire date and time
    async fn list_all(&self) -> Result<Vec<ScheduledItem>, StoreError>;
}
