// In-process item store, used when no database is reachable

use super::ItemStore;
use crate::errors::StoreError;
use crate::models::{ItemStatus, ScheduledItem};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

/// Non-durable item store backed by a map
///
/// Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryItemStore {
    items: RwLock<HashMap<Uuid, ScheduledItem>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. to simulate records left by a previous process
    pub fn with_items(items: impl IntoIterator<Item = ScheduledItem>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().map(|item| (item.id, item)).collect()),
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<ScheduledItem> {
        self.items.read().await.get(&id).cloned()
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.items.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    async fn insert(&self, item: &ScheduledItem) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        if items.contains_key(&item.id) {
            return Err(StoreError::QueryFailed(format!(
                "Duplicate scheduled item id: {}",
                item.id
            )));
        }
        items.insert(item.id, item.clone());
        Ok(())
    }

    async fn find_pending(&self) -> Result<Vec<ScheduledItem>, StoreError> {
        let items = self.items.read().await;
        Ok(items.values().filter(|i| i.is_pending()).cloned().collect())
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        id: Uuid,
        status: ItemStatus,
        sent_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        match items.get_mut(&id) {
            Some(item) => {
                if item.complete(status, sent_at) {
                    Ok(())
                } else {
                    Err(StoreError::NotFound(id))
                }
            }
            None => Err(StoreError::NotFound(id)),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        // Fired items are kept for reporting
        if !items.get(&id).is_some_and(|item| item.is_pending()) {
            return Err(StoreError::NotFound(id));
        }
        items.remove(&id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<ScheduledItem>, StoreError> {
        let mut all: Vec<ScheduledItem> = self.items.read().await.values().cloned().collect();
        all.sort_by(|a, b| {
            a.fire_at()
                .cmp(&b.fire_at())
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(all)
    }
}
