use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::commands::{CommandContext, CommandRegistry};
use crate::error::BotError;
use crate::media::{sender_key, MediaStore};
use crate::platform::{InboundEvent, IncomingMessage, Transport};
use crate::recovery::RevocationRecovery;

/// What the dispatcher did with a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    Command(String),
    Cached(PathBuf),
    Ignored,
}

/// Entry point for inbound events.
///
/// Every event is handled inside its own failure boundary: errors are logged and
/// dropped so the transport keeps delivering.
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    media: MediaStore,
    transport: Arc<dyn Transport>,
    recovery: RevocationRecovery,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CommandRegistry>,
        media: MediaStore,
        transport: Arc<dyn Transport>,
        audit_chat_id: String,
    ) -> Self {
        let recovery = RevocationRecovery::new(
            Arc::clone(&registry),
            media.clone(),
            Arc::clone(&transport),
            audit_chat_id,
        );
        Self {
            registry,
            media,
            transport,
            recovery,
        }
    }

    /// Consume events until the transport closes the stream.
    ///
    /// Each event runs on its own task, so a slow command never holds up the
    /// events behind it. Returns once the stream has ended and in-flight
    /// handlers have finished.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<InboundEvent>) {
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        let dispatcher = Arc::clone(&self);
                        in_flight.spawn(async move { dispatcher.on_event(event).await });
                    }
                    None => break,
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("Event handler aborted: {}", e);
                    }
                }
            }
        }

        info!("Event stream closed, waiting for {} handler(s)", in_flight.len());
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Event handler aborted: {}", e);
            }
        }
    }

    pub async fn on_event(&self, event: InboundEvent) {
        match event {
            InboundEvent::Ready => info!("Transport is ready"),
            InboundEvent::Message(msg) => self.on_message(msg).await,
            InboundEvent::Revoke { before, after } => {
                self.recovery.on_revoke(before.as_ref(), &after).await
            }
        }
    }

    pub async fn on_message(&self, msg: IncomingMessage) {
        let id = msg.id.clone();
        match self.handle_message(msg).await {
            Ok(Handled::Ignored) => {}
            Ok(handled) => debug!("Message {} handled: {:?}", id, handled),
            Err(e) => error!("Failed to handle message {}: {:#}", id, e),
        }
    }

    pub async fn handle_message(&self, msg: IncomingMessage) -> Result<Handled> {
        if let Some(command) = self.registry.find_match(&msg.text) {
            info!("Command {} from {}", command.name(), msg.author);
            let ctx = CommandContext {
                message: msg,
                transport: Arc::clone(&self.transport),
                registry: Arc::clone(&self.registry),
            };
            command
                .run(&ctx)
                .await
                .map_err(|cause| BotError::Action {
                    command: command.name().to_string(),
                    cause,
                })?;
            return Ok(Handled::Command(command.name().to_string()));
        }

        if msg.has_media && !msg.from_me {
            let contact = self.transport.contact(&msg).await?;
            let key = sender_key(&contact.number)?;
            let attachment = self.transport.download_media(&msg).await?;
            let path = self.media.put(&key, &attachment).await?;
            debug!("Cached media from +{} at {}", contact.number, path.display());
            return Ok(Handled::Cached(path));
        }

        Ok(Handled::Ignored)
    }
}
