// SMTP delivery gateway built on lettre's async transport

use super::DeliveryGateway;
use crate::config::SmtpConfig;
use crate::errors::DeliveryError;
use crate::models::{Attachment, Envelope};
use async_trait::async_trait;
use base64::Engine;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Gateway sending HTML mail through an SMTP relay with STARTTLS
pub struct SmtpGateway {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpGateway {
    /// Build the transport; no connection is opened until the first send
    pub fn new(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let from_address: Address =
            config
                .from_address
                .parse()
                .map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
                    address: config.from_address.clone(),
                    reason: e.to_string(),
                })?;
        let from = Mailbox::new(config.from_name.clone(), from_address);

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| DeliveryError::Transport(format!("SMTP relay: {}", e)))?
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_seconds)));

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    /// Render an envelope into a MIME message
    ///
    /// Without attachments the message is a single HTML part, otherwise a
    /// multipart/mixed message with the HTML body first.
    pub fn build_message(&self, envelope: &Envelope) -> Result<Message, DeliveryError> {
        let to: Mailbox = envelope.recipient.trim().parse().map_err(
            |e: lettre::address::AddressError| DeliveryError::InvalidAddress {
                address: envelope.recipient.clone(),
                reason: e.to_string(),
            },
        )?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(envelope.subject.clone());

        let message = if envelope.attachments.is_empty() {
            builder
                .header(ContentType::TEXT_HTML)
                .body(envelope.html_body.clone())
        } else {
            let mut multipart =
                MultiPart::mixed().singlepart(SinglePart::html(envelope.html_body.clone()));
            for attachment in &envelope.attachments {
                multipart = multipart.singlepart(attachment_part(attachment)?);
            }
            builder.multipart(multipart)
        };

        message.map_err(|e| DeliveryError::MessageBuild(e.to_string()))
    }
}

/// Decode a base64 attachment into a MIME part
///
/// Data URLs (`data:application/pdf;base64,...`) are accepted as well.
pub fn attachment_part(attachment: &Attachment) -> Result<SinglePart, DeliveryError> {
    let invalid = |reason: String| DeliveryError::InvalidAttachment {
        filename: attachment.filename.clone(),
        reason,
    };

    let data = attachment
        .data
        .split_once("base64,")
        .map(|(_, payload)| payload)
        .unwrap_or(&attachment.data)
        .trim();
    let content = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| invalid(format!("invalid base64: {}", e)))?;
    let content_type = ContentType::parse(&attachment.content_type)
        .map_err(|e| invalid(format!("invalid content type: {}", e)))?;

    Ok(MailAttachment::new(attachment.filename.clone()).body(content, content_type))
}

#[async_trait]
impl DeliveryGateway for SmtpGateway {
    #[instrument(skip(self, envelope), fields(recipient = %envelope.recipient))]
    async fn deliver(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        let message = self.build_message(envelope)?;

        match self.transport.send(message).await {
            Ok(response) => {
                debug!(code = %response.code(), "Message accepted by SMTP server");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "SMTP send failed");
                Err(DeliveryError::Transport(e.to_string()))
            }
        }
    }
}
