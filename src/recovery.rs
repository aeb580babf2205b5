use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info};

use crate::commands::CommandRegistry;
use crate::error::BotError;
use crate::media::{self, sender_key, MediaStore};
use crate::platform::{Contact, IncomingMessage, OutboundPayload, Transport};

/// What happened to a revoked message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// Original content unknown
    NoOriginal,
    /// The bot's own message was revoked
    OwnMessage,
    /// The revoked message was a command invocation
    Command,
    /// Cached media was forwarded to the audit chat
    Media,
    /// The text was forwarded to the audit chat
    Text,
}

/// Forwards the content of messages deleted for everyone to an audit chat.
pub struct RevocationRecovery {
    registry: Arc<CommandRegistry>,
    media: MediaStore,
    transport: Arc<dyn Transport>,
    audit_chat_id: String,
}

fn audit_line(contact: &Contact, text: &str) -> String {
    format!("+{} ({}): {}", contact.number, contact.display_name(), text)
}

impl RevocationRecovery {
    pub fn new(
        registry: Arc<CommandRegistry>,
        media: MediaStore,
        transport: Arc<dyn Transport>,
        audit_chat_id: String,
    ) -> Self {
        Self {
            registry,
            media,
            transport,
            audit_chat_id,
        }
    }

    /// Handle a revoke event; failures are logged, never returned
    pub async fn on_revoke(&self, before: Option<&IncomingMessage>, after: &IncomingMessage) {
        match self.recover(before).await {
            Ok(outcome) => debug!("Revoke of {} handled: {:?}", after.id, outcome),
            Err(e) => error!("Failed to recover revoked message {}: {:#}", after.id, e),
        }
    }

    pub async fn recover(&self, before: Option<&IncomingMessage>) -> Result<Recovery> {
        let Some(before) = before else {
            return Ok(Recovery::NoOriginal);
        };
        if before.from_me {
            return Ok(Recovery::OwnMessage);
        }
        if self.registry.find_match(&before.text).is_some() {
            return Ok(Recovery::Command);
        }

        let contact = self.transport.contact(before).await?;
        let line = audit_line(&contact, &before.text);

        if before.has_media {
            let key = sender_key(&contact.number)?;
            let path = self
                .media
                .get(&key)
                .await?
                .ok_or_else(|| BotError::MissingMedia(key.clone()))?;
            let attachment = media::load_from_path(&path).await?;

            self.transport
                .send(
                    &self.audit_chat_id,
                    OutboundPayload::media(attachment, Some(line)),
                )
                .await?;
            info!("Forwarded revoked media from +{} to audit chat", contact.number);
            Ok(Recovery::Media)
        } else {
            self.transport
                .send(&self.audit_chat_id, OutboundPayload::text(line))
                .await?;
            info!("Forwarded revoked text from +{} to audit chat", contact.number);
            Ok(Recovery::Text)
        }
    }
}
