//! Port Interfaces
//!
//! Defines the transport collaborator following the Hexagonal Architecture
//! pattern. Infrastructure adapters (WebSocket, in-memory loopback) implement
//! these contracts; the stream client only ever talks to the traits.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Connector`: performs one connection attempt to an endpoint
//! - `Transport`: one established duplex text connection

use std::time::Duration;

use async_trait::async_trait;

/// Errors raised by transport adapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Endpoint could not be reached or refused the handshake.
    #[error("connection failed: {0}")]
    Connect(String),
    /// Handshake did not finish in time.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),
    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(String),
    /// Reading from the connection failed.
    #[error("receive failed: {0}")]
    Receive(String),
    /// The connection is already closed.
    #[error("connection closed")]
    Closed,
}

/// Performs a single connection attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is unreachable or the handshake fails.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// An established duplex connection carrying text frames.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send {
    /// Write one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame could not be written.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Read the next text frame.
    ///
    /// Returns `None` once the peer has closed the connection. Must be
    /// cancel-safe: dropping the future loses no frame.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the connection. Closing twice is harmless.
    async fn close(&mut self);
}
