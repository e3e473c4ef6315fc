//! Transport client backed by a protocol sidecar.
//!
//! The messaging network's wire protocol is spoken by a separate sidecar
//! process. This client reaches it over a WebSocket and exchanges JSON frames:
//!
//! - to sidecar: `{"op":"connect"}`, `{"op":"send","id","to","content"}`, `{"op":"logout"}`
//! - from sidecar: `{"event":"qr"|"open"|"close"|"messages"|"creds"|"ack", ...}`

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bridge_core::{
    Credentials, DisconnectReason, MessageReceipt, OutboundContent, TransportClient,
    TransportError, TransportEvent,
};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

/// Close reason the sidecar reports when the device was unlinked.
pub const LOGGED_OUT_REASON: &str = "logged_out";

type AckResult = Result<(), TransportError>;
type PendingAcks = Arc<Mutex<HashMap<String, oneshot::Sender<AckResult>>>>;

/// Sidecar connection settings.
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// WebSocket URL of the sidecar.
    pub url: String,
    /// How long `send` waits for the sidecar's acknowledgement.
    pub send_timeout: Duration,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3001".to_string(),
            send_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command<'a> {
    Connect {
        #[serde(skip_serializing_if = "Option::is_none")]
        credentials: Option<Credentials>,
    },
    Send {
        id: &'a str,
        to: &'a str,
        content: &'a OutboundContent,
    },
    Logout,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Notice {
    Qr {
        qr: String,
    },
    Open,
    Close {
        #[serde(default)]
        reason: Option<String>,
    },
    Messages {
        messages: Vec<Value>,
    },
    Creds {
        credentials: Credentials,
    },
    Ack {
        id: String,
        #[serde(default)]
        error: Option<String>,
    },
}

struct Link {
    outbox: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Link {
    fn abort(self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// `TransportClient` that delegates the wire protocol to a sidecar process.
pub struct SidecarTransport {
    config: SidecarConfig,
    events: mpsc::UnboundedSender<TransportEvent>,
    pending: PendingAcks,
    link: Mutex<Option<Link>>,
}

impl SidecarTransport {
    /// Create a client emitting lifecycle events on `events`.
    #[must_use]
    pub fn new(config: SidecarConfig, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            config,
            events,
            pending: Arc::new(Mutex::new(HashMap::new())),
            link: Mutex::new(None),
        }
    }

    fn outbox(&self) -> Result<mpsc::UnboundedSender<String>, TransportError> {
        self.link
            .lock()
            .as_ref()
            .map(|link| link.outbox.clone())
            .ok_or(TransportError::ConnectionClosed)
    }
}

impl Drop for SidecarTransport {
    fn drop(&mut self) {
        if let Some(link) = self.link.lock().take() {
            link.abort();
        }
    }
}

#[async_trait]
impl TransportClient for SidecarTransport {
    async fn connect(&self, credentials: Option<Credentials>) -> Result<(), TransportError> {
        if let Some(old) = self.link.lock().take() {
            old.abort();
        }
        fail_pending(&self.pending);

        let (socket, _) = connect_async(self.config.url.as_str())
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        tracing::debug!(url = %self.config.url, "sidecar socket open");

        let (mut sink, mut stream) = socket.split();
        let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<String>();

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbox_rx.recv().await {
                if sink.send(Message::text(frame)).await.is_err() {
                    break;
                }
            }
        });

        let events = self.events.clone();
        let pending = Arc::clone(&self.pending);
        let reader = tokio::spawn(async move {
            let mut close_reported = false;
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!("Sidecar socket error: {e}");
                        break;
                    }
                };
                if let Some(event) = read_notice(text.as_str(), &pending) {
                    close_reported |= matches!(event, TransportEvent::Closed(_));
                    if events.send(event).is_err() {
                        break;
                    }
                }
            }

            fail_pending(&pending);
            if !close_reported {
                let _ = events.send(TransportEvent::Closed(DisconnectReason::Other(
                    "sidecar connection lost".to_string(),
                )));
            }
        });

        let hello = encode(&Command::Connect { credentials })?;
        let _ = outbox.send(hello);
        *self.link.lock() = Some(Link {
            outbox,
            reader,
            writer,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let frame = encode(&Command::Logout)?;
        self.outbox()?
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn send(
        &self,
        jid: &str,
        content: OutboundContent,
    ) -> Result<MessageReceipt, TransportError> {
        let outbox = self.outbox()?;
        let id = Uuid::new_v4().to_string();
        let frame = encode(&Command::Send {
            id: &id,
            to: jid,
            content: &content,
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);
        if outbox.send(frame).is_err() {
            self.pending.lock().remove(&id);
            return Err(TransportError::ConnectionClosed);
        }

        match tokio::time::timeout(self.config.send_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(MessageReceipt { id }),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(TransportError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(TransportError::Timeout)
            }
        }
    }
}

/// Map one sidecar frame to a transport event, resolving acks in place.
fn read_notice(text: &str, pending: &PendingAcks) -> Option<TransportEvent> {
    let notice: Notice = match serde_json::from_str(text) {
        Ok(notice) => notice,
        Err(e) => {
            tracing::warn!("Invalid sidecar frame: {e}");
            return None;
        }
    };

    match notice {
        Notice::Qr { qr } => Some(TransportEvent::PairingCode(qr)),
        Notice::Open => Some(TransportEvent::Opened),
        Notice::Close { reason } => Some(TransportEvent::Closed(match reason.as_deref() {
            Some(LOGGED_OUT_REASON) => DisconnectReason::LoggedOut,
            Some(other) => DisconnectReason::Other(other.to_string()),
            None => DisconnectReason::Other("closed by sidecar".to_string()),
        })),
        Notice::Messages { messages } => Some(TransportEvent::InboundMessages(messages)),
        Notice::Creds { credentials } => Some(TransportEvent::CredentialsUpdated(credentials)),
        Notice::Ack { id, error } => {
            if let Some(tx) = pending.lock().remove(&id) {
                let _ = tx.send(error.map_or(Ok(()), |e| Err(TransportError::Rejected(e))));
            } else {
                tracing::debug!(ack_id = %id, "ack for unknown send");
            }
            None
        }
    }
}

fn fail_pending(pending: &PendingAcks) {
    for (_, tx) in pending.lock().drain() {
        let _ = tx.send(Err(TransportError::ConnectionClosed));
    }
}

fn encode(command: &Command<'_>) -> Result<String, TransportError> {
    serde_json::to_string(command).map_err(|e| TransportError::Protocol(e.to_string()))
}
