//! Single outbound send.

use std::sync::Arc;

use bridge_core::{
    Attachment, Connectivity, MessageReceipt, OutboundContent, SendRequest, TransportClient,
    TransportError,
};
use thiserror::Error;

/// Address suffix of individual accounts on the network.
pub const DEFAULT_ADDRESS_SUFFIX: &str = "@s.whatsapp.net";

/// Dispatch error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Session is not connected")]
    NotConnected,
    #[error("Recipient is empty")]
    InvalidRecipient,
    #[error("Invalid location: {0}")]
    InvalidLocation(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result of one send: `Ok` once the network accepted it.
pub type DispatchOutcome = Result<MessageReceipt, DispatchError>;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Suffix appended to bare phone numbers.
    pub address_suffix: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            address_suffix: DEFAULT_ADDRESS_SUFFIX.to_string(),
        }
    }
}

/// Validates and executes single sends against the transport.
pub struct DispatchGateway {
    session: Arc<dyn Connectivity>,
    transport: Arc<dyn TransportClient>,
    config: GatewayConfig,
}

impl DispatchGateway {
    /// Create a gateway.
    #[must_use]
    pub fn new(
        session: Arc<dyn Connectivity>,
        transport: Arc<dyn TransportClient>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            session,
            transport,
            config,
        }
    }

    /// Whether the session can currently send.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Send one message. Never retries.
    ///
    /// # Errors
    /// `NotConnected` without touching the transport when the session is
    /// down; validation errors for bad recipients or coordinates; the
    /// transport's error otherwise.
    pub async fn send(&self, request: &SendRequest) -> DispatchOutcome {
        if !self.session.is_connected() {
            return Err(DispatchError::NotConnected);
        }

        let jid = self.normalize_recipient(&request.to)?;
        let content = build_content(&request.message, request.attachment.as_ref())?;
        let receipt = self.transport.send(&jid, content).await?;

        tracing::info!(to = %jid, message_id = %receipt.id, "message sent");
        Ok(receipt)
    }

    /// Append the address suffix unless the recipient is already qualified.
    ///
    /// Anything containing `@` counts as qualified, so group addresses pass
    /// through untouched.
    ///
    /// # Errors
    /// Returns `InvalidRecipient` for blank input.
    pub fn normalize_recipient(&self, raw: &str) -> Result<String, DispatchError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DispatchError::InvalidRecipient);
        }
        if raw.contains('@') {
            Ok(raw.to_string())
        } else {
            Ok(format!("{raw}{}", self.config.address_suffix))
        }
    }
}

/// Build the transport payload for a body and optional attachment.
///
/// Media kinds carry the body as caption, except audio; locations drop it.
///
/// # Errors
/// Returns `InvalidLocation` when coordinates do not parse or are out of range.
pub fn build_content(
    body: &str,
    attachment: Option<&Attachment>,
) -> Result<OutboundContent, DispatchError> {
    let caption = || (!body.is_empty()).then(|| body.to_string());

    let content = match attachment {
        None => OutboundContent::Text {
            text: body.to_string(),
        },
        Some(Attachment::Image { url }) => OutboundContent::Image {
            url: url.clone(),
            caption: caption(),
        },
        Some(Attachment::Video { url }) => OutboundContent::Video {
            url: url.clone(),
            caption: caption(),
        },
        Some(Attachment::Document { url }) => OutboundContent::Document {
            url: url.clone(),
            caption: caption(),
        },
        Some(Attachment::Audio { url }) => OutboundContent::Audio { url: url.clone() },
        Some(Attachment::Location {
            latitude,
            longitude,
        }) => {
            let latitude = latitude
                .degrees()
                .filter(|d| (-90.0..=90.0).contains(d))
                .ok_or_else(|| DispatchError::InvalidLocation(format!("latitude {latitude:?}")))?;
            let longitude = longitude
                .degrees()
                .filter(|d| (-180.0..=180.0).contains(d))
                .ok_or_else(|| {
                    DispatchError::InvalidLocation(format!("longitude {longitude:?}"))
                })?;
            OutboundContent::Location {
                latitude,
                longitude,
            }
        }
    };
    Ok(content)
}
