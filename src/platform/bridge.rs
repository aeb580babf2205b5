use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use super::{Contact, InboundEvent, IncomingMessage, MediaPayload, OutboundPayload, Transport};
use crate::config::BridgeConfig;
use crate::error::BotError;

const EVENT_QUEUE_SIZE: usize = 256;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<std::result::Result<Value, String>>>>>;

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WireEvent {
    Ready,
    Message {
        message: IncomingMessage,
    },
    Revoke {
        #[serde(default)]
        before: Option<IncomingMessage>,
        after: IncomingMessage,
    },
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// One decoded line of bridge output
#[derive(Debug)]
enum BridgeLine {
    Event(InboundEvent),
    Response {
        id: u64,
        outcome: std::result::Result<Value, String>,
    },
}

fn parse_line(line: &str) -> Result<BridgeLine> {
    let value: Value = serde_json::from_str(line).context("bridge line is not JSON")?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .context("bridge line has no type")?
        .to_string();

    match kind.as_str() {
        "event" => {
            let event: WireEvent =
                serde_json::from_value(value).context("malformed bridge event")?;
            Ok(BridgeLine::Event(match event {
                WireEvent::Ready => InboundEvent::Ready,
                WireEvent::Message { message } => InboundEvent::Message(message),
                WireEvent::Revoke { before, after } => InboundEvent::Revoke { before, after },
            }))
        }
        "response" => {
            let resp: WireResponse =
                serde_json::from_value(value).context("malformed bridge response")?;
            let outcome = if resp.ok {
                Ok(resp.result)
            } else {
                Err(resp
                    .error
                    .unwrap_or_else(|| "unspecified bridge error".to_string()))
            };
            Ok(BridgeLine::Response {
                id: resp.id,
                outcome,
            })
        }
        other => anyhow::bail!("unknown bridge line type: {}", other),
    }
}

/// Transport backed by a bridge child process speaking newline-delimited JSON.
///
/// The bridge owns the session with the messaging service. It writes events and
/// responses to stdout and reads requests from stdin; responses are matched to
/// requests by `id`.
pub struct BridgeTransport {
    stdin: Mutex<ChildStdin>,
    child: Mutex<Child>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
}

impl BridgeTransport {
    /// Start the bridge process. Returns the transport and the stream of inbound
    /// events; the stream ends when the bridge exits.
    pub async fn spawn(config: &BridgeConfig) -> Result<(Arc<Self>, mpsc::Receiver<InboundEvent>)> {
        info!(
            "Starting bridge: {} {:?} (session: {})",
            config.command,
            config.args,
            config.session_path.display()
        );

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .arg("--session")
            .arg(&config.session_path)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start bridge process: {}", config.command))?;

        let stdin = child.stdin.take().context("bridge stdin was not captured")?;
        let stdout = child
            .stdout
            .take()
            .context("bridge stdout was not captured")?;

        // Drain stderr so a chatty bridge never blocks on a full pipe.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "bridge", "{}", line);
                }
            });
        }

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_SIZE);

        let closed = Arc::new(AtomicBool::new(false));

        let reader_pending = Arc::clone(&pending);
        let reader_closed = Arc::clone(&closed);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        route_line(&line, &reader_pending, &events_tx).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read from bridge: {}", e);
                        break;
                    }
                }
            }

            warn!("Bridge output closed");
            let mut pending = reader_pending.lock().await;
            reader_closed.store(true, Ordering::SeqCst);
            for (_, tx) in pending.drain() {
                let _ = tx.send(Err("bridge exited".to_string()));
            }
        });

        let transport = Arc::new(Self {
            stdin: Mutex::new(stdin),
            child: Mutex::new(child),
            pending,
            closed,
            next_id: AtomicU64::new(1),
        });

        Ok((transport, events_rx))
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            // Checked under the pending lock so nothing is queued after the drain
            let mut pending = self.pending.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(BotError::Transport(format!("{}: bridge exited", method)).into());
            }
            pending.insert(id, tx);
        }

        let mut line = serde_json::to_string(&Request { id, method, params })?;
        line.push('\n');

        let written = {
            let mut stdin = self.stdin.lock().await;
            match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.pending.lock().await.remove(&id);
            return Err(BotError::Transport(format!("failed to write {}: {}", method, e)).into());
        }

        debug!("bridge request #{} {}", id, method);

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(BotError::Transport(format!("{}: {}", method, message)).into()),
            Err(_) => Err(BotError::Transport(format!("{}: bridge dropped the request", method)).into()),
        }
    }

    async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value)
            .with_context(|| format!("Failed to decode bridge response to {}", method))
    }

    /// Stop the bridge process
    pub async fn shutdown(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        child
            .kill()
            .await
            .context("Failed to stop bridge process")?;
        info!("Bridge stopped");
        Ok(())
    }
}

async fn route_line(line: &str, pending: &Pending, events: &mpsc::Sender<InboundEvent>) {
    match parse_line(line) {
        Ok(BridgeLine::Event(event)) => {
            if events.send(event).await.is_err() {
                debug!("Dropping bridge event: receiver closed");
            }
        }
        Ok(BridgeLine::Response { id, outcome }) => {
            let waiter = pending.lock().await.remove(&id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(outcome);
                }
                None => warn!("Bridge response for unknown request #{}", id),
            }
        }
        Err(e) => warn!("Skipping bridge line: {:#}", e),
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    async fn reply(&self, msg: &IncomingMessage, payload: OutboundPayload) -> Result<()> {
        self.call(
            "reply",
            json!({ "message_id": msg.id, "chat_id": msg.chat_id, "payload": payload }),
        )
        .await?;
        Ok(())
    }

    async fn send(&self, chat_id: &str, payload: OutboundPayload) -> Result<()> {
        self.call("send", json!({ "chat_id": chat_id, "payload": payload }))
            .await?;
        Ok(())
    }

    async fn download_media(&self, msg: &IncomingMessage) -> Result<MediaPayload> {
        self.call_as("download_media", json!({ "message_id": msg.id }))
            .await
    }

    async fn quoted_message(&self, msg: &IncomingMessage) -> Result<Option<IncomingMessage>> {
        if !msg.has_quoted_msg {
            return Ok(None);
        }
        self.call_as("quoted_message", json!({ "message_id": msg.id }))
            .await
    }

    async fn delete_message(&self, msg: &IncomingMessage, for_everyone: bool) -> Result<()> {
        self.call(
            "delete_message",
            json!({ "message_id": msg.id, "chat_id": msg.chat_id, "for_everyone": for_everyone }),
        )
        .await?;
        Ok(())
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        self.call("delete_chat", json!({ "chat_id": chat_id })).await?;
        Ok(())
    }

    async fn clear_chat(&self, chat_id: &str) -> Result<()> {
        self.call("clear_chat", json!({ "chat_id": chat_id })).await?;
        Ok(())
    }

    async fn contact(&self, msg: &IncomingMessage) -> Result<Contact> {
        self.call_as(
            "contact",
            json!({ "message_id": msg.id, "author": msg.author }),
        )
        .await
    }
}
