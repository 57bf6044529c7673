use super::DeliveryGateway;
use crate::errors::DeliveryError;
use crate::models::Envelope;
use async_trait::async_trait;

/// Dry-run gateway that logs instead of sending
///
/// Selected when SMTP is disabled in configuration.
#[derive(Debug, Default, Clone)]
pub struct LogOnlyGateway;

#[async_trait]
impl DeliveryGateway for LogOnlyGateway {
    #[tracing::instrument(skip(self, envelope), fields(recipient = %envelope.recipient))]
    async fn deliver(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        tracing::info!(
            subject = %envelope.subject,
            attachments = envelope.attachments.len(),
            body_bytes = envelope.html_body.len(),
            "SMTP disabled, message logged instead of sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_only_gateway_always_succeeds() {
        let gateway = LogOnlyGateway;
        let envelope = Envelope::new("x@example.com", "Hello", "<p>Hi</p>");
        assert!(gateway.deliver(&envelope).await.is_ok());
    }
}
