//! Core abstractions for the messaging bridge.
//!
//! This crate provides the fundamental building blocks:
//! - `SessionState` - Connectivity state of the single network session
//! - `BridgeEvent` / `TransportEvent` - Outbound and transport-side events
//! - `BroadcastHub` - Fan-out of events to live subscribers
//! - `TransportClient`, `CredentialStore` and `Connectivity` traits

pub mod event;
pub mod hub;
pub mod message;
pub mod state;
pub mod traits;

pub use event::{BridgeEvent, Credentials, DisconnectReason, TransportEvent};
pub use hub::{BroadcastHub, HubConfig, SubscriberId};
pub use message::{
    Attachment, Contact, Coordinate, MessageReceipt, MessageTemplate, OutboundContent, SendRequest,
};
pub use state::SessionState;
pub use traits::{Connectivity, CredentialStore, StoreError, TransportClient, TransportError};
