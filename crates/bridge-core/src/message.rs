//! Outbound message types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Latitude or longitude in decimal degrees.
///
/// Clients send coordinates either as JSON numbers or as numeric strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coordinate {
    /// Numeric degrees.
    Degrees(f64),
    /// Degrees as text, parsed on use.
    Text(String),
}

impl Coordinate {
    /// Parse into finite decimal degrees.
    #[must_use]
    pub fn degrees(&self) -> Option<f64> {
        let value = match self {
            Self::Degrees(d) => Some(*d),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        };
        value.filter(|d| d.is_finite())
    }
}

impl From<f64> for Coordinate {
    fn from(value: f64) -> Self {
        Self::Degrees(value)
    }
}

/// Attachment carried by an outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attachment {
    /// Image by URL; body becomes the caption.
    Image { url: String },
    /// Video by URL; body becomes the caption.
    Video { url: String },
    /// Document by URL; body becomes the caption.
    Document { url: String },
    /// Audio by URL; body is dropped.
    Audio { url: String },
    /// Static location pin; body is dropped.
    Location {
        latitude: Coordinate,
        longitude: Coordinate,
    },
}

impl Attachment {
    /// Attachment kind as it appears on the wire.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Image { .. } => "image",
            Self::Video { .. } => "video",
            Self::Document { .. } => "document",
            Self::Audio { .. } => "audio",
            Self::Location { .. } => "location",
        }
    }
}

/// A single outbound send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRequest {
    /// Recipient phone number or fully qualified address.
    pub to: String,
    /// Body text.
    #[serde(default)]
    pub message: String,
    /// Optional attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

impl SendRequest {
    /// Plain text request.
    #[must_use]
    pub fn text(to: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            message: message.into(),
            attachment: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Bulk-send recipient.
///
/// Everything besides `phone` is kept as-is and echoed back in progress
/// and error events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Recipient phone number.
    pub phone: String,
    /// Arbitrary client metadata (name, tags, ...).
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Contact {
    /// Contact without metadata.
    #[must_use]
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            metadata: Map::new(),
        }
    }
}

/// Bulk-send message template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTemplate {
    /// Body text.
    #[serde(default)]
    pub text: String,
    /// Optional attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

impl MessageTemplate {
    /// Text-only template.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachment: None,
        }
    }

    /// Build the send request for one contact.
    #[must_use]
    pub fn request_for(&self, contact: &Contact) -> SendRequest {
        SendRequest {
            to: contact.phone.clone(),
            message: self.text.clone(),
            attachment: self.attachment.clone(),
        }
    }
}

/// Payload handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundContent {
    Text {
        text: String,
    },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Video {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Document {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Audio {
        url: String,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
}

/// Transport acknowledgement that the network accepted a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReceipt {
    /// Message identifier assigned on send.
    pub id: String,
}
