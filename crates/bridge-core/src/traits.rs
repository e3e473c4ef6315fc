//! Core traits for the transport and credential seams.

use async_trait::async_trait;
use thiserror::Error;

use crate::{Credentials, MessageReceipt, OutboundContent};

/// Transport error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Rejected by network: {0}")]
    Rejected(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Timed out waiting for acknowledgement")]
    Timeout,
}

/// Trait for clients speaking the messaging network's protocol.
///
/// Lifecycle and inbound traffic are not returned from these calls; the
/// client emits them as `TransportEvent`s on the channel it was built with.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Open (or re-open) the session, resuming from stored credentials.
    async fn connect(&self, credentials: Option<Credentials>) -> Result<(), TransportError>;

    /// Log out and close the session.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Send one message.
    ///
    /// Resolves once the network accepted the message, not when it is read.
    async fn send(
        &self,
        jid: &str,
        content: OutboundContent,
    ) -> Result<MessageReceipt, TransportError>;
}

/// Credential store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Trait for credential persistence backends.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load stored credentials, if any.
    async fn load(&self) -> Result<Option<Credentials>, StoreError>;

    /// Replace stored credentials.
    async fn save(&self, credentials: &Credentials) -> Result<(), StoreError>;
}

/// Live view of whether the session can send.
pub trait Connectivity: Send + Sync {
    /// Whether the session is currently connected.
    fn is_connected(&self) -> bool;
}
