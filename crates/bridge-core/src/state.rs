//! Connectivity state of the network session.

use crate::BridgeEvent;

/// State of the single session with the messaging network.
///
/// The pairing token lives inside `AwaitingPairing`, so a token can only
/// exist while the session is waiting to be linked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No live connection. Initial state at process start.
    #[default]
    Disconnected,
    /// The transport presented a pairing token and waits for it to be scanned.
    AwaitingPairing {
        /// Short-lived pairing token.
        token: String,
    },
    /// Session is open and can send.
    Connected,
}

impl SessionState {
    /// Whether the session can currently send.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Current pairing token, if any.
    #[must_use]
    pub fn pairing_token(&self) -> Option<&str> {
        match self {
            Self::AwaitingPairing { token } => Some(token),
            _ => None,
        }
    }

    /// Snapshot of this state as a `status` event.
    #[must_use]
    pub fn status_event(&self) -> BridgeEvent {
        BridgeEvent::Status {
            connected: self.is_connected(),
            qr: self.pairing_token().map(str::to_owned),
        }
    }
}
