//! Client-facing surface of the messaging bridge.
//!
//! Provides:
//! - Wire protocol for inbound commands
//! - WebSocket event channel (feature: websocket)
//! - HTTP status routes (feature: websocket)

pub mod protocol;

#[cfg(feature = "websocket")]
pub mod http;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use protocol::{ClientMessage, CommandError};
#[cfg(feature = "websocket")]
pub use websocket::{AppState, router};
