//! Connection
//!
//! Lifecycle of the single transport to the price feed. A [`Connection`]
//! tracks one in-flight attempt or one established transport, never both,
//! and reports progress through [`Connection::next_event`].
//!
//! The connection never retries on its own. Closure is reported to the
//! owner, which consults the reconnection policy.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::application::ports::{Connector, Transport, TransportError};
use crate::domain::streaming::ConnectionState;

/// Errors from connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// No open transport.
    #[error("not connected")]
    NotConnected,

    /// The transport rejected the operation.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Progress reported by [`Connection::next_event`].
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The in-flight attempt finished.
    Opened(Result<(), TransportError>),
    /// The open transport produced a frame, an error, or closed (`None`).
    Inbound(Option<Result<String, TransportError>>),
}

type PendingOpen = BoxFuture<'static, Result<Box<dyn Transport>, TransportError>>;

/// The single transport to the price feed.
pub struct Connection {
    connector: Arc<dyn Connector>,
    endpoint: String,
    connect_timeout: Duration,
    state: ConnectionState,
    pending: Option<PendingOpen>,
    transport: Option<Box<dyn Transport>>,
    session_id: Option<Uuid>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a disconnected connection.
    #[must_use]
    pub fn new(
        connector: Arc<dyn Connector>,
        endpoint: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            endpoint: endpoint.into(),
            connect_timeout,
            state: ConnectionState::Disconnected,
            pending: None,
            transport: None,
            session_id: None,
        }
    }

    /// Start an attempt.
    ///
    /// Returns `false` without doing anything when an attempt is already in
    /// flight or the connection is open.
    pub fn open(&mut self) -> bool {
        if self.state.is_active() {
            return false;
        }

        let connector = Arc::clone(&self.connector);
        let endpoint = self.endpoint.clone();
        let timeout = self.connect_timeout;

        self.pending = Some(Box::pin(async move {
            match tokio::time::timeout(timeout, connector.connect(&endpoint)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(timeout)),
            }
        }));
        self.state = ConnectionState::Connecting;
        true
    }

    /// Wait for the next connection event.
    ///
    /// Pends forever when there is neither an attempt in flight nor an open
    /// transport. Cancel-safe: an unfinished attempt is kept for the next
    /// call.
    pub async fn next_event(&mut self) -> ConnectionEvent {
        if let Some(pending) = self.pending.as_mut() {
            let result = pending.await;
            self.pending = None;

            return match result {
                Ok(transport) => {
                    self.transport = Some(transport);
                    self.state = ConnectionState::Connected;
                    self.session_id = Some(Uuid::new_v4());
                    ConnectionEvent::Opened(Ok(()))
                }
                Err(e) => {
                    self.state = ConnectionState::Errored;
                    ConnectionEvent::Opened(Err(e))
                }
            };
        }

        if let Some(transport) = self.transport.as_mut() {
            return ConnectionEvent::Inbound(transport.recv().await);
        }

        std::future::pending().await
    }

    /// Write one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] unless the connection is
    /// open, or the transport error if the write fails.
    pub async fn send(&mut self, text: String) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Connected {
            tracing::warn!(state = %self.state, "send failed - not connected");
            return Err(ConnectionError::NotConnected);
        }

        let transport = self.transport.as_mut().ok_or(ConnectionError::NotConnected)?;
        transport.send_text(text).await?;
        Ok(())
    }

    /// Tear down the attempt or transport and move to `Disconnected`.
    ///
    /// Returns whether anything was in flight or open. Idempotent.
    pub async fn close(&mut self) -> bool {
        let had_attempt = self.pending.take().is_some();
        let transport = self.transport.take();
        let was_live = had_attempt || transport.is_some();

        if let Some(mut transport) = transport {
            transport.close().await;
        }

        self.state = ConnectionState::Disconnected;
        self.session_id = None;
        was_live
    }

    /// Get the current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether frames may be sent.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Identifier of the current session, assigned when the connection opens.
    #[must_use]
    pub const fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    /// Get the endpoint this connection targets.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
