// Repository layer for database operations

pub mod queries;
pub mod scheduled_item;

pub use scheduled_item::ScheduledItemRepository;
