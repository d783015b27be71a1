//! Price Feed Streaming Types
//!
//! Canonical representation of the frames exchanged with the price feed:
//!
//! - Client → server: `{"type": "subscribe" | "unsubscribe", "symbols": [...]}`
//! - Server → client: `price_update`, `subscription_confirmed`,
//!   `unsubscription_confirmed`

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A symbol identifier (stock ticker).
pub type Symbol = String;

// =============================================================================
// Connection State
// =============================================================================

/// Raw state of the single transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport and no attempt in flight.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Transport open; frames may be sent.
    Connected,
    /// The last attempt failed before reaching `Connected`.
    Errored,
}

impl ConnectionState {
    /// Get the state name used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Errored => "errored",
        }
    }

    /// Whether an attempt is in flight or established.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Inbound Messages
// =============================================================================

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    /// Latest prices for one or more symbols.
    #[serde(rename = "price_update")]
    PriceUpdate {
        /// Symbol to price mapping.
        #[serde(rename = "data")]
        prices: BTreeMap<Symbol, Decimal>,
        /// Server timestamp, when provided.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    /// Server acknowledged a subscribe frame.
    #[serde(rename = "subscription_confirmed")]
    SubscriptionAck {
        /// Acknowledged symbols.
        symbols: Vec<Symbol>,
    },
    /// Server acknowledged an unsubscribe frame.
    #[serde(rename = "unsubscription_confirmed")]
    UnsubscriptionAck {
        /// Acknowledged symbols.
        symbols: Vec<Symbol>,
    },
}

impl InboundMessage {
    /// Wire `type` tags accepted from the server.
    pub const KNOWN_TYPES: &'static [&'static str] = &[
        "price_update",
        "subscription_confirmed",
        "unsubscription_confirmed",
    ];

    /// Get the wire `type` tag of this message.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PriceUpdate { .. } => "price_update",
            Self::SubscriptionAck { .. } => "subscription_confirmed",
            Self::UnsubscriptionAck { .. } => "unsubscription_confirmed",
        }
    }
}

// =============================================================================
// Outbound Frames
// =============================================================================

/// Kind of an outbound subscription frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// Start streaming the listed symbols.
    Subscribe,
    /// Stop streaming the listed symbols.
    Unsubscribe,
}

impl FrameKind {
    /// Get the wire `type` tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

/// A client → server subscription frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// Frame kind, serialized as `type`.
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// Symbols in send order.
    pub symbols: Vec<Symbol>,
}

impl OutboundFrame {
    /// Create a subscribe frame.
    #[must_use]
    pub const fn subscribe(symbols: Vec<Symbol>) -> Self {
        Self {
            kind: FrameKind::Subscribe,
            symbols,
        }
    }

    /// Create an unsubscribe frame.
    #[must_use]
    pub const fn unsubscribe(symbols: Vec<Symbol>) -> Self {
        Self {
            kind: FrameKind::Unsubscribe,
            symbols,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frame_wire_format() {
        let frame = OutboundFrame::subscribe(vec!["AAPL".to_string(), "GOOGL".to_string()]);
        let json = serde_json::to_value(&frame).unwrap();

        assert_eq!(json["type"], "subscribe");
        assert_eq!(json["symbols"][0], "AAPL");
        assert_eq!(json["symbols"][1], "GOOGL");
    }

    #[test]
    fn unsubscribe_frame_wire_format() {
        let frame = OutboundFrame::unsubscribe(vec!["TSLA".to_string()]);
        let json = serde_json::to_string(&frame).unwrap();

        assert_eq!(json, r#"{"type":"unsubscribe","symbols":["TSLA"]}"#);
    }

    #[test]
    fn price_update_parses_numbers_as_decimal() {
        let json = r#"{"type":"price_update","data":{"AAPL":175.23,"MSFT":410.5},"timestamp":"2024-01-15T10:00:00Z"}"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();

        match msg {
            InboundMessage::PriceUpdate { prices, timestamp } => {
                assert_eq!(prices["AAPL"], Decimal::new(17523, 2));
                assert_eq!(prices["MSFT"], Decimal::new(4105, 1));
                assert!(timestamp.is_some());
            }
            other => panic!("expected PriceUpdate, got {other:?}"),
        }
    }

    #[test]
    fn price_update_timestamp_is_optional() {
        let json = r#"{"type":"price_update","data":{"AAPL":1}}"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();

        assert!(matches!(
            msg,
            InboundMessage::PriceUpdate {
                timestamp: None,
                ..
            }
        ));
    }

    #[test]
    fn kind_matches_wire_tag() {
        for json in [
            r#"{"type":"price_update","data":{}}"#,
            r#"{"type":"subscription_confirmed","symbols":["AAPL"]}"#,
            r#"{"type":"unsubscription_confirmed","symbols":[]}"#,
        ] {
            let msg: InboundMessage = serde_json::from_str(json).unwrap();
            let value: serde_json::Value = serde_json::from_str(json).unwrap();
            assert_eq!(msg.kind(), value["type"]);
            assert!(InboundMessage::KNOWN_TYPES.contains(&msg.kind()));
        }
    }

    #[test]
    fn connection_state_activity() {
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Connected.is_active());
        assert!(!ConnectionState::Disconnected.is_active());
        assert!(!ConnectionState::Errored.is_active());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
