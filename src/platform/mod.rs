pub mod bridge;
#[cfg(test)]
pub mod testing;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A chat message as seen by the bot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Transport-specific message ID
    pub id: String,
    /// Chat the message was posted in
    pub chat_id: String,
    /// Transport-specific ID of the author
    pub author: String,
    /// Message body (the caption for media messages)
    #[serde(default)]
    pub text: String,
    /// Sent by the account the bot runs as
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub has_media: bool,
    /// Attachment kind reported by the transport ("image", "video", ...)
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub has_quoted_msg: bool,
}

impl IncomingMessage {
    pub fn has_image(&self) -> bool {
        self.has_media && self.media_type.as_deref() == Some("image")
    }
}

/// Sender details resolved through the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Stable numeric identity (phone number without '+')
    pub number: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Contact {
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or("")
    }
}

/// Raw attachment: MIME type plus base64 encoded bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub mime_type: String,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl MediaPayload {
    pub fn from_base64(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
            filename: None,
        }
    }
}

/// Something the bot sends out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundPayload {
    Text {
        text: String,
    },
    Media {
        media: MediaPayload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(default)]
        as_sticker: bool,
    },
}

impl OutboundPayload {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundPayload::Text { text: text.into() }
    }

    pub fn media(media: MediaPayload, caption: Option<String>) -> Self {
        OutboundPayload::Media {
            media,
            caption,
            as_sticker: false,
        }
    }

    pub fn sticker(media: MediaPayload) -> Self {
        OutboundPayload::Media {
            media,
            caption: None,
            as_sticker: true,
        }
    }
}

/// Events delivered by the transport
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Ready,
    Message(IncomingMessage),
    /// A message was deleted for everyone. `before` is the original, when known.
    Revoke {
        before: Option<IncomingMessage>,
        after: IncomingMessage,
    },
}

/// The operations the bot needs from a messaging service.
///
/// Implemented by the bridge adapter in production and by a recording fake in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn reply(&self, msg: &IncomingMessage, payload: OutboundPayload) -> Result<()>;

    async fn send(&self, chat_id: &str, payload: OutboundPayload) -> Result<()>;

    async fn download_media(&self, msg: &IncomingMessage) -> Result<MediaPayload>;

    async fn quoted_message(&self, msg: &IncomingMessage) -> Result<Option<IncomingMessage>>;

    async fn delete_message(&self, msg: &IncomingMessage, for_everyone: bool) -> Result<()>;

    async fn delete_chat(&self, chat_id: &str) -> Result<()>;

    async fn clear_chat(&self, chat_id: &str) -> Result<()>;

    async fn contact(&self, msg: &IncomingMessage) -> Result<Contact>;
}

/// Turn a bare phone number into a chat ID; IDs that already carry a domain pass through.
pub fn normalize_chat_id(raw: &str, contact_suffix: &str) -> String {
    let raw = raw.trim().trim_start_matches('+');
    if raw.contains('@') {
        raw.to_string()
    } else {
        format!("{}{}", raw, contact_suffix)
    }
}
