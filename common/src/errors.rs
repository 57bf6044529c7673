// Error handling framework
// One enum per concern: persistence, scheduling requests, mail delivery

use thiserror::Error;
use uuid::Uuid;

/// Item store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Item store unavailable: {0}")]
    Unavailable(String),

    #[error("Scheduled item not found: {0}")]
    NotFound(Uuid),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

impl StoreError {
    /// True when the backing store could not be reached at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Errors surfaced to collaborators that schedule, cancel or list items
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Malformed schedule, invalid {field}: {reason}")]
    MalformedSchedule { field: String, reason: String },

    #[error("Scheduled item not found: {0}")]
    NotFound(Uuid),

    #[error("Item store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Item store query failed: {0}")]
    Store(String),
}

impl ScheduleError {
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ScheduleError::MalformedSchedule {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for ScheduleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => ScheduleError::StoreUnavailable(msg),
            StoreError::NotFound(id) => ScheduleError::NotFound(id),
            StoreError::QueryFailed(msg) => ScheduleError::Store(msg),
        }
    }
}

/// Mail delivery errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Invalid attachment '{filename}': {reason}")]
    InvalidAttachment { filename: String, reason: String },

    #[error("Failed to build message: {0}")]
    MessageBuild(String),

    #[error("Mail transport failed: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// Short label used as a metrics dimension
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::InvalidAddress { .. } => "invalid_address",
            DeliveryError::InvalidAttachment { .. } => "invalid_attachment",
            DeliveryError::MessageBuild(_) => "message_build",
            DeliveryError::Transport(_) => "transport",
        }
    }
}

// Connection-class failures mean the store is unreachable, everything else is a query problem
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            sqlx::Error::Database(db_err) => StoreError::QueryFailed(db_err.message().to_string()),
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::QueryFailed(format!("Failed to (de)serialize attachments: {}", err))
    }
}
