//! Stream Lifecycle Types
//!
//! Events delivered to the consumer and the observable status of the
//! stream. Events arrive on a single channel in the order they occurred;
//! status is a latest-value snapshot.

use std::time::Duration;

use super::streaming::{ConnectionState, InboundMessage};

// =============================================================================
// Events
// =============================================================================

/// Notification delivered to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The connection is open and the subscription snapshot was sent.
    ///
    /// If writing the snapshot failed, a `Closed` event follows directly.
    Opened,
    /// A well-formed server frame.
    Message(InboundMessage),
    /// The connection closed or an attempt failed.
    Closed {
        /// What ended the connection.
        reason: CloseReason,
    },
    /// A reconnect attempt has been scheduled.
    Reconnecting {
        /// 1-based attempt number since the last successful connection.
        attempt: u32,
        /// Delay before the attempt starts.
        delay: Duration,
    },
    /// Something went wrong that the consumer should know about.
    Error(StreamError),
}

impl StreamEvent {
    /// Get the event name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Message(_) => "message",
            Self::Closed { .. } => "closed",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Error(_) => "error",
        }
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The consumer called `disconnect`.
    ClientRequested,
    /// The server closed the connection.
    ServerClosed,
    /// Reading or writing failed.
    TransportError(String),
    /// The attempt never reached the open state.
    OpenFailed(String),
}

impl CloseReason {
    /// Whether the closure was initiated by the consumer.
    #[must_use]
    pub const fn is_client_requested(&self) -> bool {
        matches!(self, Self::ClientRequested)
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientRequested => f.write_str("client requested"),
            Self::ServerClosed => f.write_str("server closed"),
            Self::TransportError(e) => write!(f, "transport error: {e}"),
            Self::OpenFailed(e) => write!(f, "open failed: {e}"),
        }
    }
}

/// Errors surfaced to the consumer as events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// A connection attempt failed.
    #[error("connection attempt failed: {0}")]
    OpenFailed(String),

    /// A raw send was dropped because the connection was not open.
    #[error("send dropped - not connected")]
    SendWhileDisconnected,

    /// Automatic reconnection gave up.
    #[error("gave up after {attempts} reconnect attempts")]
    RetryBudgetExhausted {
        /// Attempts made since the last successful connection.
        attempts: u32,
    },
}

// =============================================================================
// Status
// =============================================================================

/// Reconnection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPhase {
    /// No retry pending.
    #[default]
    Idle,
    /// A retry is scheduled.
    Scheduled {
        /// Delay that was chosen for the retry.
        delay: Duration,
    },
    /// The retry budget ran out; only an explicit connect resumes.
    Exhausted,
}

/// Latest observable state of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStatus {
    /// Connection state.
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful connection.
    pub reconnect_attempt: u32,
    /// Reconnection phase.
    pub retry: RetryPhase,
}

impl StreamStatus {
    /// Whether the stream is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Whether the stream will stay down without an explicit connect.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.state.is_active() && !matches!(self.retry, RetryPhase::Scheduled { .. })
    }
}
