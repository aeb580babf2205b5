use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{Contact, IncomingMessage, MediaPayload, OutboundPayload, Transport};

/// Outbound call captured by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Reply { message_id: String, payload: OutboundPayload },
    Send { chat_id: String, payload: OutboundPayload },
    DeleteMessage { message_id: String, for_everyone: bool },
    DeleteChat(String),
    ClearChat(String),
}

/// In-memory transport that records every outbound call.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    contacts: Mutex<HashMap<String, Contact>>,
    media: Mutex<HashMap<String, MediaPayload>>,
    quoted: Mutex<HashMap<String, IncomingMessage>>,
    fail_replies: Mutex<bool>,
    fail_sends: Mutex<bool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contact(self, author: &str, number: &str, name: &str) -> Self {
        self.contacts.lock().unwrap().insert(
            author.to_string(),
            Contact {
                number: number.to_string(),
                display_name: Some(name.to_string()),
            },
        );
        self
    }

    pub fn with_media(self, message_id: &str, media: MediaPayload) -> Self {
        self.media
            .lock()
            .unwrap()
            .insert(message_id.to_string(), media);
        self
    }

    pub fn with_quoted(self, message_id: &str, quoted: IncomingMessage) -> Self {
        self.quoted
            .lock()
            .unwrap()
            .insert(message_id.to_string(), quoted);
        self
    }

    pub fn fail_replies(&self, fail: bool) {
        *self.fail_replies.lock().unwrap() = fail;
    }

    pub fn fail_sends(&self, fail: bool) {
        *self.fail_sends.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Build a plain text message from `author` in a private chat
pub fn message(id: &str, author: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        id: id.to_string(),
        chat_id: author.to_string(),
        author: author.to_string(),
        text: text.to_string(),
        from_me: false,
        has_media: false,
        media_type: None,
        has_quoted_msg: false,
    }
}

/// Build an image message from `author`
pub fn image_message(id: &str, author: &str, caption: &str) -> IncomingMessage {
    IncomingMessage {
        has_media: true,
        media_type: Some("image".to_string()),
        ..message(id, author, caption)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn reply(&self, msg: &IncomingMessage, payload: OutboundPayload) -> Result<()> {
        if *self.fail_replies.lock().unwrap() {
            anyhow::bail!("reply rejected");
        }
        self.record(Call::Reply {
            message_id: msg.id.clone(),
            payload,
        });
        Ok(())
    }

    async fn send(&self, chat_id: &str, payload: OutboundPayload) -> Result<()> {
        if *self.fail_sends.lock().unwrap() {
            anyhow::bail!("send rejected");
        }
        self.record(Call::Send {
            chat_id: chat_id.to_string(),
            payload,
        });
        Ok(())
    }

    async fn download_media(&self, msg: &IncomingMessage) -> Result<MediaPayload> {
        self.media
            .lock()
            .unwrap()
            .get(&msg.id)
            .cloned()
            .with_context(|| format!("no media for message {}", msg.id))
    }

    async fn quoted_message(&self, msg: &IncomingMessage) -> Result<Option<IncomingMessage>> {
        Ok(self.quoted.lock().unwrap().get(&msg.id).cloned())
    }

    async fn delete_message(&self, msg: &IncomingMessage, for_everyone: bool) -> Result<()> {
        self.record(Call::DeleteMessage {
            message_id: msg.id.clone(),
            for_everyone,
        });
        Ok(())
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        self.record(Call::DeleteChat(chat_id.to_string()));
        Ok(())
    }

    async fn clear_chat(&self, chat_id: &str) -> Result<()> {
        self.record(Call::ClearChat(chat_id.to_string()));
        Ok(())
    }

    async fn contact(&self, msg: &IncomingMessage) -> Result<Contact> {
        self.contacts
            .lock()
            .unwrap()
            .get(&msg.author)
            .cloned()
            .with_context(|| format!("unknown contact {}", msg.author))
    }
}
