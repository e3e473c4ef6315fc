//! Command-line and environment configuration.

use std::{path::PathBuf, time::Duration};

use bridge_core::HubConfig;
use bridge_dispatch::GatewayConfig;
use bridge_session::{SessionConfig, sidecar::SidecarConfig};
use clap::Parser;

/// Messaging bridge server.
#[derive(Debug, Clone, Parser)]
#[command(name = "bridge-server")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Directory holding persisted session credentials.
    #[arg(long, env = "BRIDGE_AUTH_DIR", default_value = "./auth_info")]
    pub auth_dir: PathBuf,

    /// WebSocket URL of the protocol sidecar.
    #[arg(long, env = "BRIDGE_SIDECAR_URL", default_value = "ws://127.0.0.1:3001")]
    pub sidecar_url: String,

    /// Seconds to wait before reconnecting a dropped session.
    #[arg(long, env = "BRIDGE_RECONNECT_BACKOFF_SECS", default_value_t = 5)]
    pub reconnect_backoff_secs: u64,

    /// Suffix appended to bare phone numbers.
    #[arg(long, env = "BRIDGE_ADDRESS_SUFFIX", default_value = "@s.whatsapp.net")]
    pub address_suffix: String,

    /// Per-subscriber outbound queue length.
    #[arg(long, env = "BRIDGE_SUBSCRIBER_BUFFER", default_value_t = 256)]
    pub subscriber_buffer: usize,

    /// Seconds a send waits for the network's acknowledgement.
    #[arg(long, env = "BRIDGE_SEND_TIMEOUT_SECS", default_value_t = 30)]
    pub send_timeout_secs: u64,
}

impl Config {
    /// `host:port` to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub const fn session(&self) -> SessionConfig {
        SessionConfig {
            reconnect_backoff: Duration::from_secs(self.reconnect_backoff_secs),
        }
    }

    #[must_use]
    pub fn sidecar(&self) -> SidecarConfig {
        SidecarConfig {
            url: self.sidecar_url.clone(),
            send_timeout: Duration::from_secs(self.send_timeout_secs),
        }
    }

    #[must_use]
    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            address_suffix: self.address_suffix.clone(),
        }
    }

    #[must_use]
    pub const fn hub(&self) -> HubConfig {
        HubConfig {
            subscriber_buffer: self.subscriber_buffer,
        }
    }
}
