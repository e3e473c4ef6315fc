//! Session controller driving the transport lifecycle.

use std::{sync::Arc, time::Duration};

use bridge_core::{
    BridgeEvent, BroadcastHub, Connectivity, CredentialStore, Credentials, DisconnectReason,
    SessionState, SubscriberId, TransportClient, TransportError, TransportEvent, hub::Frame,
};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default delay before reconnecting after a non-terminal close.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Session controller configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Fixed delay before each reconnect attempt.
    pub reconnect_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
        }
    }
}

/// What the controller must do after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Wait for the next transport event.
    Stay,
    /// Re-invoke `connect` after the given delay.
    Reconnect(Duration),
}

/// State machine for the single network session.
///
/// Owns the session state and pushes every change into the broadcast hub.
/// Retries are unbounded with a fixed backoff; only an explicit logout is
/// terminal.
pub struct SessionController {
    transport: Arc<dyn TransportClient>,
    credentials: Arc<dyn CredentialStore>,
    hub: Arc<BroadcastHub>,
    config: SessionConfig,
    state: RwLock<SessionState>,
}

impl SessionController {
    /// Create a controller in the `Disconnected` state.
    #[must_use]
    pub fn new(
        transport: Arc<dyn TransportClient>,
        credentials: Arc<dyn CredentialStore>,
        hub: Arc<BroadcastHub>,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            credentials,
            hub,
            config,
            state: RwLock::new(SessionState::Disconnected),
        }
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    /// Current pairing token, if the session awaits pairing.
    #[must_use]
    pub fn pairing_token(&self) -> Option<String> {
        self.state.read().pairing_token().map(str::to_owned)
    }

    /// Hub this controller publishes into.
    #[must_use]
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Register a hub subscriber whose snapshot is the current state.
    ///
    /// State changes publish while holding the state lock, so the snapshot
    /// and the subscriber's first published event can never disagree.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<Frame>) {
        let state = self.state.read();
        self.hub.subscribe(&state)
    }

    /// Load credentials and ask the transport to connect.
    ///
    /// A failed attempt is treated like a non-terminal close.
    pub async fn connect(&self) -> Transition {
        let credentials = match self.credentials.load().await {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::warn!("Failed to load credentials, pairing from scratch: {e}");
                None
            }
        };
        tracing::info!(resumed = credentials.is_some(), "connecting session");

        match self.transport.connect(credentials).await {
            Ok(()) => Transition::Stay,
            Err(e) => {
                tracing::warn!("Connect failed: {e}");
                self.transition(SessionState::Disconnected, None);
                Transition::Reconnect(self.config.reconnect_backoff)
            }
        }
    }

    /// Apply one transport event.
    pub async fn handle_event(&self, event: TransportEvent) -> Transition {
        match event {
            TransportEvent::PairingCode(token) => {
                tracing::info!("pairing code available");
                let event = BridgeEvent::Qr { qr: token.clone() };
                self.transition(SessionState::AwaitingPairing { token }, Some(&event));
                Transition::Stay
            }
            TransportEvent::Opened => {
                tracing::info!("session connected");
                let event = SessionState::Connected.status_event();
                self.transition(SessionState::Connected, Some(&event));
                Transition::Stay
            }
            TransportEvent::Closed(reason) => self.on_closed(&reason),
            TransportEvent::InboundMessages(messages) => {
                tracing::info!(count = messages.len(), "inbound messages");
                self.hub.publish(&BridgeEvent::Messages { messages });
                Transition::Stay
            }
            TransportEvent::CredentialsUpdated(credentials) => {
                self.persist(&credentials).await;
                Transition::Stay
            }
        }
    }

    /// Drive the session until cancelled or the event channel closes.
    pub async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        cancel: CancellationToken,
    ) {
        let mut next = self.connect().await;
        loop {
            if let Transition::Reconnect(backoff) = next {
                tracing::info!(backoff_secs = backoff.as_secs_f64(), "reconnect scheduled");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(backoff) => {}
                }
                next = self.connect().await;
                continue;
            }

            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                tracing::warn!("transport event channel closed");
                break;
            };
            next = self.handle_event(event).await;
        }
        tracing::info!("session controller stopped");
    }

    /// Log the session out. The transport reports the close as an event.
    ///
    /// # Errors
    /// Returns error if the transport rejects the request.
    pub async fn logout(&self) -> Result<(), TransportError> {
        tracing::info!("logout requested");
        self.transport.disconnect().await
    }

    fn on_closed(&self, reason: &DisconnectReason) -> Transition {
        let reconnect = reason.should_reconnect();
        tracing::info!(%reason, reconnect, "session closed");
        let event = SessionState::Disconnected.status_event();
        self.transition(SessionState::Disconnected, Some(&event));

        if reconnect {
            Transition::Reconnect(self.config.reconnect_backoff)
        } else {
            Transition::Stay
        }
    }

    async fn persist(&self, credentials: &Credentials) {
        if let Err(e) = self.credentials.save(credentials).await {
            tracing::error!("Failed to persist credentials: {e}");
        } else {
            tracing::debug!("credentials persisted");
        }
    }

    /// Replace the state and publish under the state lock.
    ///
    /// `event` is always published; without one, the status event of the
    /// new state goes out only if the state changed.
    fn transition(&self, next: SessionState, event: Option<&BridgeEvent>) {
        let mut state = self.state.write();
        let status = (event.is_none() && *state != next).then(|| next.status_event());
        *state = next;
        if let Some(event) = event.or(status.as_ref()) {
            self.hub.publish(event);
        }
    }
}

impl Connectivity for SessionController {
    fn is_connected(&self) -> bool {
        self.state.read().is_connected()
    }
}
