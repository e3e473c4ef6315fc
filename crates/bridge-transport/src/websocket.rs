//! WebSocket event channel.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use bridge_core::{BridgeEvent, BroadcastHub, SubscriberId};
use bridge_dispatch::{BulkJob, BulkScheduler, DispatchGateway};
use bridge_session::SessionController;
use futures::{SinkExt, StreamExt};

use crate::{
    http,
    protocol::{ClientMessage, CommandError},
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionController>,
    pub hub: Arc<BroadcastHub>,
    pub gateway: Arc<DispatchGateway>,
    pub scheduler: Arc<BulkScheduler>,
}

impl AppState {
    /// Bundle the components. The hub is the one the session publishes into.
    #[must_use]
    pub fn new(
        session: Arc<SessionController>,
        gateway: Arc<DispatchGateway>,
        scheduler: Arc<BulkScheduler>,
    ) -> Self {
        Self {
            hub: Arc::clone(session.hub()),
            session,
            gateway,
            scheduler,
        }
    }
}

/// Router with the status routes and the event channel.
///
/// The channel is served at `/ws`, and at `/` for upgrade requests.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(http::root))
        .route("/qr", get(http::qr))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

pub(crate) async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (id, mut frames) = state.session.subscribe();
    tracing::info!(subscriber_id = %id, "subscriber connected");

    let send_task = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => {
                    state
                        .hub
                        .send_to(id, &BridgeEvent::error("Invalid message: binary frame is not UTF-8"));
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(subscriber_id = %id, "WebSocket error: {e}");
                break;
            }
        };

        if let Err(e) = handle_command(&state, id, &text) {
            tracing::warn!(subscriber_id = %id, "Command failed: {e}");
            state.hub.send_to(id, &e.to_event());
        }
    }

    state.hub.unsubscribe(id);
    send_task.abort();
    tracing::info!(subscriber_id = %id, "subscriber disconnected");
}

/// Execute one inbound frame on behalf of subscriber `id`.
///
/// Single sends run in their own task so the read loop keeps accepting
/// commands; their outcome goes back to `id` only.
fn handle_command(state: &AppState, id: SubscriberId, text: &str) -> Result<(), CommandError> {
    let command = ClientMessage::parse(text)?;
    tracing::debug!(subscriber_id = %id, command = command.kind(), "command received");

    match command {
        ClientMessage::SendMessage(request) => {
            let state = state.clone();
            tokio::spawn(async move {
                let event = match state.gateway.send(&request).await {
                    Ok(_) => BridgeEvent::MessageSent { to: request.to },
                    Err(e) => {
                        tracing::warn!(subscriber_id = %id, to = %request.to, "Send failed: {e}");
                        CommandError::from(e).to_event()
                    }
                };
                state.hub.send_to(id, &event);
            });
        }
        ClientMessage::SendBulk {
            contacts,
            messages,
            delay_config,
        } => {
            let job = BulkJob::new(contacts, messages, delay_config)?;
            tracing::info!(subscriber_id = %id, recipients = job.total(), "bulk job requested");
            // The job reports through the hub; its summary is not needed here.
            drop(state.scheduler.start(job)?);
        }
        ClientMessage::Logout => {
            let state = state.clone();
            tokio::spawn(async move {
                // The close arrives as a transport event and is broadcast as status.
                if let Err(e) = state.session.logout().await {
                    tracing::warn!(subscriber_id = %id, "Logout failed: {e}");
                    state.hub.send_to(id, &BridgeEvent::error(format!("Logout failed: {e}")));
                }
            });
        }
        ClientMessage::CancelBulk => {
            if !state.scheduler.cancel() {
                return Err(CommandError::NoActiveJob);
            }
            tracing::info!(subscriber_id = %id, "bulk job cancel requested");
        }
    }
    Ok(())
}
