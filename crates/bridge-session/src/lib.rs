//! Session lifecycle and credential storage for the messaging bridge.
//!
//! Provides:
//! - `SessionController` - Connect / pair / reconnect state machine
//! - Credential stores (memory, file)
//! - `SidecarTransport` - Transport client backed by a protocol sidecar (feature: sidecar)

pub mod controller;
pub mod storage;

#[cfg(feature = "sidecar")]
pub mod sidecar;

pub use controller::{SessionConfig, SessionController, Transition};
