//! Read-only HTTP status routes.

use axum::{
    Json,
    extract::{State, WebSocketUpgrade, ws::rejection::WebSocketUpgradeRejection},
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::websocket::{AppState, handle_socket};

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusDocument {
    pub status: String,
    pub connected: bool,
    /// ISO 8601, UTC, millisecond precision.
    pub timestamp: String,
}

/// Body of `GET /qr`. `qr` is `null` unless the session awaits pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrDocument {
    pub qr: Option<String>,
    pub connected: bool,
}

/// `GET /`: status document, or the event channel for upgrade requests.
pub async fn root(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
) -> Response {
    if let Ok(ws) = ws {
        return ws
            .on_upgrade(move |socket| handle_socket(socket, state))
            .into_response();
    }

    Json(StatusDocument {
        status: "online".to_string(),
        connected: state.session.state().is_connected(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
    .into_response()
}

/// `GET /qr`: current pairing token.
pub async fn qr(State(state): State<AppState>) -> Json<QrDocument> {
    let session = state.session.state();
    Json(QrDocument {
        qr: session.pairing_token().map(str::to_owned),
        connected: session.is_connected(),
    })
}
