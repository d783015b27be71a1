#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Price Stream Client - Real-time Market Data Subscriber
//!
//! A client for a WebSocket price feed: it keeps one connection open,
//! tracks which symbols the consumer wants, replays that set after every
//! reconnect and delivers price updates as ordered events.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core streaming logic and data types
//!   - `streaming`: Wire messages, outbound frames, connection state
//!   - `lifecycle`: Events and status observed by the consumer
//!   - `subscription`: Subscription registry
//!
//! - **Application**: Port definitions and consumer services
//!   - `ports`: `Connector`/`Transport` contracts
//!   - `services`: Event dispatch into handler callbacks
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `market_feed`: Stream client, connection, reconnection, codec, transports
//!   - `config`: Environment configuration
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Tracing and OpenTelemetry setup
//!
//! # Data Flow
//!
//! ```text
//!                  commands             ┌─────────────────────────┐
//! StreamClient ────────────────────────►│      stream worker      │
//!   (handle)   ◄──── status (watch) ────│ Connection · Registry · │◄──► price feed (WS)
//!                                       │    ReconnectPolicy      │
//! StreamHandler ◄─── events (mpsc) ─────└─────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use price_stream_client::{StreamClient, StreamClientConfig, StreamEvent, WebSocketConnector};
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (events_tx, mut events) = mpsc::channel(1024);
//! let client = StreamClient::spawn(
//!     StreamClientConfig::new("ws://localhost:8000/ws/prices"),
//!     Arc::new(WebSocketConnector::new()),
//!     events_tx,
//! );
//!
//! client.subscribe(["AAPL", "MSFT"])?;
//! client.connect()?;
//!
//! while let Some(event) = events.recv().await {
//!     if let StreamEvent::Message(message) = event {
//!         println!("{message:?}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no I/O.
pub mod domain;

/// Application layer - Port definitions and consumer services.
pub mod application;

/// Infrastructure layer - Stream client, adapters and integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::lifecycle::{CloseReason, RetryPhase, StreamError, StreamEvent, StreamStatus};
pub use domain::streaming::{ConnectionState, FrameKind, InboundMessage, OutboundFrame, Symbol};
pub use domain::subscription::SubscriptionRegistry;

// Ports and services
pub use application::ports::{Connector, Transport, TransportError};
pub use application::services::{LatestPrices, StreamHandler, dispatch_events};

// Stream client
pub use infrastructure::market_feed::{
    ConnectOutcome, MemoryConnector, MemoryPeer, MemoryServer, ReconnectConfig, StreamClient,
    StreamClientConfig, StreamClientError, WebSocketConnector,
};

// Infrastructure config
pub use infrastructure::config::{AppConfig, ConfigError, StreamSettings};

// Metrics
pub use infrastructure::metrics::{MetricsError, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
