//! Events flowing into and out of the bridge.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Contact;

/// Event sent from the bridge to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// Connectivity snapshot or change.
    Status {
        connected: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qr: Option<String>,
    },
    /// New pairing token available.
    Qr { qr: String },
    /// Inbound message batch, relayed untouched.
    Messages { messages: Vec<Value> },
    /// A `send_message` command was accepted by the network.
    MessageSent { to: String },
    /// One bulk item was sent.
    BulkProgress {
        sent: usize,
        total: usize,
        #[serde(rename = "currentContact")]
        current_contact: Contact,
    },
    /// One bulk item failed.
    BulkError { contact: Contact, error: String },
    /// Bulk job finished its sequence.
    BulkComplete { sent: usize, total: usize },
    /// Bulk job stopped before the end of its sequence.
    BulkCancelled { sent: usize, total: usize },
    /// Malformed or failed command.
    Error { message: String },
}

impl BridgeEvent {
    /// Create an error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Wire name of the event, for logging.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Qr { .. } => "qr",
            Self::Messages { .. } => "messages",
            Self::MessageSent { .. } => "message_sent",
            Self::BulkProgress { .. } => "bulk_progress",
            Self::BulkError { .. } => "bulk_error",
            Self::BulkComplete { .. } => "bulk_complete",
            Self::BulkCancelled { .. } => "bulk_cancelled",
            Self::Error { .. } => "error",
        }
    }
}

/// Opaque session credential material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(pub Value);

/// Why the transport closed the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The user unlinked this device. Terminal until restart.
    LoggedOut,
    /// Anything else: network loss, server restart, protocol error.
    Other(String),
}

impl DisconnectReason {
    /// Whether the controller should reconnect after this close.
    #[must_use]
    pub const fn should_reconnect(&self) -> bool {
        !matches!(self, Self::LoggedOut)
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoggedOut => f.write_str("logged out"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

/// Lifecycle and inbound events emitted by a transport client.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A pairing token is ready to be scanned.
    PairingCode(String),
    /// The session is open.
    Opened,
    /// The session was closed.
    Closed(DisconnectReason),
    /// Messages arrived from the network.
    InboundMessages(Vec<Value>),
    /// Credential material changed and should be persisted.
    CredentialsUpdated(Credentials),
}
