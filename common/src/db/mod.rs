// Database layer module

pub mod pool;
pub mod repositories;

pub use pool::DbPool;
pub use repositories::ScheduledItemRepository;

use crate::config::DatabaseConfig;
use crate::errors::StoreError;
use crate::store::{ItemStore, MemoryItemStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Which backend `open_item_store` selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Open the PostgreSQL item store, or fall back to memory when the database
/// is unreachable and not required
pub async fn open_item_store(
    config: &DatabaseConfig,
) -> Result<(Arc<dyn ItemStore>, StoreBackend), StoreError> {
    match DbPool::new(config).await {
        Ok(pool) => {
            let repo = ScheduledItemRepository::new(pool);
            repo.ensure_schema().await?;
            info!("Using PostgreSQL item store");
            Ok((Arc::new(repo), StoreBackend::Postgres))
        }
        Err(e) if e.is_unavailable() && !config.required => {
            warn!(error = %e, "Database unreachable, falling back to in-memory item store");
            Ok((Arc::new(MemoryItemStore::new()), StoreBackend::Memory))
        }
        Err(e) => Err(e),
    }
}
