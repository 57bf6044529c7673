// Delivery gateway: hands rendered messages to the mail transport

pub mod log_only;
pub mod smtp;

pub use log_only::LogOnlyGateway;
pub use smtp::SmtpGateway;

use crate::errors::DeliveryError;
use crate::models::Envelope;
use async_trait::async_trait;

/// Outbound mail sender
///
/// Every transport problem comes back as a `DeliveryError`; implementations
/// must not panic.
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// Send one message
    async fn deliver(&self, envelope: &Envelope) -> Result<(), DeliveryError>;
}
