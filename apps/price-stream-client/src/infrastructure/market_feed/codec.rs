//! Price Feed Codec
//!
//! JSON encoding and decoding for the price feed wire protocol.
//!
//! Inbound frames are single JSON objects discriminated by `type`. A frame is
//! rejected when it is not valid JSON, is not an object, has no string
//! `type`, carries an unknown `type`, or has a payload that does not match
//! its declared `type`. Rejected frames never reach the consumer.

use crate::domain::streaming::{InboundMessage, OutboundFrame};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame has no string `type` field.
    #[error("missing message type")]
    MissingType,

    /// Unknown message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

impl CodecError {
    /// Short label used as a metric dimension.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::MissingType => "missing_type",
            Self::UnknownMessageType(_) => "unknown_type",
            Self::InvalidFormat(_) => "invalid_format",
        }
    }
}

/// JSON codec for the price feed.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame into an [`InboundMessage`].
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is malformed or of an unknown type.
    pub fn decode(&self, text: &str) -> Result<InboundMessage, CodecError> {
        let trimmed = text.trim();

        if !trimmed.starts_with('{') {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {preview}..."
            )));
        }

        let value: serde_json::Value = serde_json::from_str(trimmed)?;

        let msg_type = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(CodecError::MissingType)?;

        if !InboundMessage::KNOWN_TYPES.contains(&msg_type) {
            return Err(CodecError::UnknownMessageType(msg_type.to_string()));
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Encode a subscription frame as JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode_frame(&self, frame: &OutboundFrame) -> Result<String, CodecError> {
        Ok(serde_json::to_string(frame)?)
    }
}
