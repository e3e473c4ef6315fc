//! Wire protocol for client commands.
//!
//! Outbound events are `bridge_core::BridgeEvent`; this module covers the
//! inbound direction and the error surface reported back to the sender.

use bridge_core::{BridgeEvent, Contact, MessageTemplate, SendRequest};
use bridge_dispatch::{DispatchError, JobError, RatePolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Command from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Send one message.
    SendMessage(SendRequest),
    /// Start a paced bulk job.
    SendBulk {
        contacts: Vec<Contact>,
        messages: Vec<MessageTemplate>,
        #[serde(rename = "delayConfig")]
        delay_config: RatePolicy,
    },
    /// Cancel the running bulk job.
    CancelBulk,
    /// End the session. It does not reconnect afterwards.
    Logout,
}

impl ClientMessage {
    /// Parse one text frame.
    ///
    /// # Errors
    /// Returns `CommandError::Malformed` for anything that is not a known command.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Command name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SendMessage(_) => "send_message",
            Self::SendBulk { .. } => "send_bulk",
            Self::CancelBulk => "cancel_bulk",
            Self::Logout => "logout",
        }
    }
}

/// Failure of a client command. Always reported to the originating client only.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Invalid message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error("No bulk job is running")]
    NoActiveJob,
}

impl CommandError {
    /// The `error` event sent back to the client.
    #[must_use]
    pub fn to_event(&self) -> BridgeEvent {
        BridgeEvent::error(self.to_string())
    }
}
