//! Price Feed Client
//!
//! Connection management for the real-time price stream.
//!
//! - `client`: consumer handle and the background task that owns all state
//! - `connection`: single transport lifecycle
//! - `reconnect`: retry decisions with bounded attempts
//! - `codec`: JSON wire format
//! - `websocket`: `tokio-tungstenite` transport
//! - `memory`: loopback transport for tests and demos

pub mod client;
pub mod codec;
pub mod connection;
pub mod memory;
pub mod reconnect;
pub mod websocket;

pub use client::{
    DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_STREAM_PATH, StreamClient,
    StreamClientConfig, StreamClientError, resolve_endpoint,
};
pub use codec::{CodecError, JsonCodec};
pub use connection::{Connection, ConnectionError, ConnectionEvent};
pub use memory::{ConnectOutcome, MemoryConnector, MemoryPeer, MemoryServer};
pub use reconnect::{ReconnectConfig, ReconnectPolicy, RetryDecision, decide};
pub use websocket::{WebSocketConnector, WsTransport};
