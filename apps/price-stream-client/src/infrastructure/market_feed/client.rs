//! Stream Client
//!
//! Consumer-facing entry point for the price feed. A [`StreamClient`] is a
//! handle to a background task that exclusively owns the connection, the
//! subscription registry and the reconnection policy. Every operation on
//! the handle is a message to that task, so state transitions happen on
//! one thread of control in the order they were requested.
//!
//! # Delivery
//!
//! - Events go to the consumer-supplied bounded channel, in order. The task
//!   waits for capacity rather than dropping events.
//! - Status is published through a [`watch`] channel and can be read at any
//!   time without waiting on the task.
//!
//! # Reconnection
//!
//! Every closure that was not requested by the consumer consults the
//! reconnection policy. On reaching `Connected` the attempt count resets
//! and the full subscription snapshot is replayed in a single frame.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::codec::JsonCodec;
use super::connection::{Connection, ConnectionError, ConnectionEvent};
use super::reconnect::{ReconnectConfig, ReconnectPolicy, RetryDecision};
use crate::application::ports::Connector;
use crate::domain::lifecycle::{CloseReason, RetryPhase, StreamError, StreamEvent, StreamStatus};
use crate::domain::streaming::{OutboundFrame, Symbol};
use crate::domain::subscription::{SubscriptionRegistry, dedup_symbols};
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Default server base URL.
pub const DEFAULT_BASE_URL: &str = "ws://localhost:8000";

/// Default stream path appended to the base URL.
pub const DEFAULT_STREAM_PATH: &str = "/ws/prices";

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolve the stream endpoint.
///
/// A `url` starting with `ws` (`ws://` or `wss://`) is used verbatim.
/// Anything else is treated as a path joined to `base`, which falls back
/// to [`DEFAULT_BASE_URL`]. Without a `url` the default stream path is used.
#[must_use]
pub fn resolve_endpoint(url: Option<&str>, base: Option<&str>) -> String {
    let url = url.map(str::trim).filter(|u| !u.is_empty());

    if let Some(url) = url
        && url.starts_with("ws")
    {
        return url.to_string();
    }

    let base = base
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(DEFAULT_BASE_URL)
        .trim_end_matches('/');
    let path = url.unwrap_or(DEFAULT_STREAM_PATH);

    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Stream client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamClientConfig {
    /// WebSocket endpoint.
    pub endpoint: String,
    /// Reconnection behavior.
    pub reconnect: ReconnectConfig,
    /// Handshake timeout.
    pub connect_timeout: Duration,
}

impl Default for StreamClientConfig {
    fn default() -> Self {
        Self {
            endpoint: resolve_endpoint(None, None),
            reconnect: ReconnectConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl StreamClientConfig {
    /// Create a configuration for `endpoint` with default reconnection.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Set the maximum number of automatic reconnect attempts.
    #[must_use]
    pub const fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect.max_attempts = attempts;
        self
    }

    /// Set the delay between reconnect attempts.
    #[must_use]
    pub const fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect.interval = interval;
        self
    }

    /// Replace the reconnection configuration.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// =============================================================================
// Error Type
// =============================================================================

/// Errors returned by [`StreamClient`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamClientError {
    /// The background task has stopped.
    #[error("stream client stopped")]
    ClientStopped,

    /// A message could not be serialized.
    #[error("failed to serialize message: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Client Handle
// =============================================================================

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Subscribe(Vec<Symbol>),
    Unsubscribe(Vec<Symbol>),
    Send(String),
    Subscriptions(oneshot::Sender<Vec<Symbol>>),
}

/// Handle to a running price stream.
///
/// Dropping the handle stops the background task and closes the connection.
#[derive(Debug)]
pub struct StreamClient {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<StreamStatus>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl StreamClient {
    /// Start the background task. The client starts disconnected.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    #[must_use]
    pub fn spawn(
        config: StreamClientConfig,
        connector: Arc<dyn Connector>,
        events: mpsc::Sender<StreamEvent>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(StreamStatus::default());
        let cancel = CancellationToken::new();

        let span = info_span!("price_stream", endpoint = %config.endpoint);
        let worker = Worker {
            connection: Connection::new(connector, config.endpoint, config.connect_timeout),
            registry: SubscriptionRegistry::new(),
            policy: ReconnectPolicy::new(config.reconnect),
            codec: JsonCodec::new(),
            events,
            status: status_tx,
            retry_at: None,
            connect_started: None,
        };
        let handle = tokio::spawn(worker.run(command_rx, cancel.clone()).instrument(span));

        Self {
            commands: command_tx,
            status: status_rx,
            cancel,
            worker: Some(handle),
        }
    }

    /// Open the connection. No-op while connecting or connected.
    ///
    /// An explicit connect cancels any scheduled retry and restores the full
    /// retry budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the background task has stopped.
    pub fn connect(&self) -> Result<(), StreamClientError> {
        self.command(Command::Connect)
    }

    /// Close the connection and cancel any scheduled retry.
    ///
    /// Subscriptions are kept and replayed on the next connect.
    ///
    /// # Errors
    ///
    /// Returns an error if the background task has stopped.
    pub fn disconnect(&self) -> Result<(), StreamClientError> {
        self.command(Command::Disconnect)
    }

    /// Add symbols to the subscription set.
    ///
    /// While connected, one subscribe frame with the given symbols is sent.
    /// Otherwise the symbols are sent with the next connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the background task has stopped.
    pub fn subscribe<I, S>(&self, symbols: I) -> Result<(), StreamClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        self.command(Command::Subscribe(
            symbols.into_iter().map(Into::into).collect(),
        ))
    }

    /// Remove symbols from the subscription set.
    ///
    /// While connected, one unsubscribe frame with the given symbols is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the background task has stopped.
    pub fn unsubscribe<I, S>(&self, symbols: I) -> Result<(), StreamClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        self.command(Command::Unsubscribe(
            symbols.into_iter().map(Into::into).collect(),
        ))
    }

    /// Serialize `message` as JSON and send it as one frame.
    ///
    /// When the connection is not open the message is dropped and a
    /// [`StreamError::SendWhileDisconnected`] event is emitted.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the background task has
    /// stopped.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), StreamClientError> {
        let text = serde_json::to_string(message)?;
        self.command(Command::Send(text))
    }

    /// Get the latest status.
    #[must_use]
    pub fn status(&self) -> StreamStatus {
        *self.status.borrow()
    }

    /// Subscribe to status changes.
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<StreamStatus> {
        self.status.clone()
    }

    /// Get the current subscription set, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the background task has stopped.
    pub async fn subscriptions(&self) -> Result<Vec<Symbol>, StreamClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::Subscriptions(reply_tx))?;
        reply_rx.await.map_err(|_| StreamClientError::ClientStopped)
    }

    /// Stop the background task and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take()
            && let Err(e) = worker.await
        {
            warn!(error = %e, "stream worker ended abnormally");
        }
    }

    fn command(&self, command: Command) -> Result<(), StreamClientError> {
        self.commands
            .send(command)
            .map_err(|_| StreamClientError::ClientStopped)
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Background Task
// =============================================================================

struct Worker {
    connection: Connection,
    registry: SubscriptionRegistry,
    policy: ReconnectPolicy,
    codec: JsonCodec,
    events: mpsc::Sender<StreamEvent>,
    status: watch::Sender<StreamStatus>,
    retry_at: Option<Instant>,
    connect_started: Option<Instant>,
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        cancel: CancellationToken,
    ) {
        debug!("stream worker started");

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },

                event = self.connection.next_event() => self.handle_connection_event(event).await,

                () = sleep_until_deadline(self.retry_at) => {
                    self.retry_at = None;
                    self.begin_connect();
                }
            }
        }

        if self.connection.close().await {
            info!("connection closed on shutdown");
            let _ = self.events.try_send(StreamEvent::Closed {
                reason: CloseReason::ClientRequested,
            });
        }
        self.retry_at = None;
        self.publish(RetryPhase::Idle);
        debug!("stream worker stopped");
    }

    // ===== Commands =====

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect().await,
            Command::Subscribe(symbols) => self.subscribe(symbols).await,
            Command::Unsubscribe(symbols) => self.unsubscribe(symbols).await,
            Command::Send(text) => self.send_raw(text).await,
            Command::Subscriptions(reply) => {
                let _ = reply.send(self.registry.snapshot());
            }
        }
    }

    fn connect(&mut self) {
        if self.connection.state().is_active() {
            debug!(state = %self.connection.state(), "connect ignored - already active");
            return;
        }

        self.retry_at = None;
        self.policy.reset();
        self.begin_connect();
    }

    async fn disconnect(&mut self) {
        let had_retry = self.retry_at.take().is_some();
        let was_live = self.connection.close().await;
        self.publish(RetryPhase::Idle);

        if had_retry || was_live {
            info!("disconnected by client");
            self.emit(StreamEvent::Closed {
                reason: CloseReason::ClientRequested,
            })
            .await;
        }
    }

    async fn subscribe(&mut self, symbols: Vec<Symbol>) {
        let symbols = dedup_symbols(symbols);
        if symbols.is_empty() {
            return;
        }

        let added = self.registry.add(&symbols);
        metrics::set_subscribed_symbols(self.registry.len());
        debug!(requested = symbols.len(), added = added.len(), "subscribe");

        if self.connection.is_connected() {
            self.send_or_lose(OutboundFrame::subscribe(symbols)).await;
        }
    }

    async fn unsubscribe(&mut self, symbols: Vec<Symbol>) {
        let symbols = dedup_symbols(symbols);
        if symbols.is_empty() {
            return;
        }

        let removed = self.registry.remove(&symbols);
        metrics::set_subscribed_symbols(self.registry.len());
        debug!(requested = symbols.len(), removed = removed.len(), "unsubscribe");

        if self.connection.is_connected() {
            self.send_or_lose(OutboundFrame::unsubscribe(symbols)).await;
        }
    }

    async fn send_raw(&mut self, text: String) {
        if !self.connection.is_connected() {
            metrics::record_send_dropped();
            warn!(state = %self.connection.state(), "send failed - not connected");
            self.emit(StreamEvent::Error(StreamError::SendWhileDisconnected))
                .await;
            return;
        }

        match self.connection.send(text).await {
            Ok(()) => metrics::record_frame_sent("raw"),
            Err(e) => self.on_send_failure(&e).await,
        }
    }

    // ===== Connection Events =====

    async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened(Ok(())) => self.on_open().await,
            ConnectionEvent::Opened(Err(e)) => {
                warn!(error = %e, attempt = self.policy.attempt_count(), "connection attempt failed");
                self.publish(RetryPhase::Idle);
                self.emit(StreamEvent::Error(StreamError::OpenFailed(e.to_string())))
                    .await;
                self.handle_loss(CloseReason::OpenFailed(e.to_string()))
                    .await;
            }
            ConnectionEvent::Inbound(Some(Ok(text))) => self.on_frame(&text).await,
            ConnectionEvent::Inbound(Some(Err(e))) => {
                warn!(error = %e, "connection error");
                self.handle_loss(CloseReason::TransportError(e.to_string()))
                    .await;
            }
            ConnectionEvent::Inbound(None) => {
                info!("server closed connection");
                self.handle_loss(CloseReason::ServerClosed).await;
            }
        }
    }

    async fn on_open(&mut self) {
        self.policy.reset();
        if let Some(started) = self.connect_started.take() {
            metrics::record_connect_duration(started.elapsed());
        }
        info!(
            session_id = ?self.connection.session_id(),
            symbols = self.registry.len(),
            "connected to price feed"
        );
        self.publish(RetryPhase::Idle);

        let snapshot = self.registry.snapshot();
        let replay = if snapshot.is_empty() {
            Ok(())
        } else {
            debug!(symbols = ?snapshot, "replaying subscriptions");
            self.send_frame(OutboundFrame::subscribe(snapshot)).await
        };

        self.emit(StreamEvent::Opened).await;
        if let Err(e) = replay {
            self.on_send_failure(&e).await;
        }
    }

    async fn on_frame(&mut self, text: &str) {
        match self.codec.decode(text) {
            Ok(message) => {
                metrics::record_frame_received(message.kind());
                self.emit(StreamEvent::Message(message)).await;
            }
            Err(e) => {
                metrics::record_decode_failure(e.label());
                warn!(error = %e, "discarding malformed frame");
            }
        }
    }

    async fn handle_loss(&mut self, reason: CloseReason) {
        self.connection.close().await;
        self.retry_at = None;
        self.connect_started = None;
        info!(reason = %reason, "connection closed");

        let decision = self.policy.on_closure();
        let attempt = self.policy.attempt_count();
        let phase = match decision {
            RetryDecision::Retry(delay) => RetryPhase::Scheduled { delay },
            RetryDecision::GiveUp => RetryPhase::Exhausted,
        };
        self.publish(phase);
        self.emit(StreamEvent::Closed { reason }).await;

        match decision {
            RetryDecision::Retry(delay) => {
                self.retry_at = Some(Instant::now() + delay);
                metrics::record_reconnect();
                info!(
                    attempt,
                    max_attempts = self.policy.config().max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "scheduling reconnect"
                );
                self.emit(StreamEvent::Reconnecting { attempt, delay }).await;
            }
            RetryDecision::GiveUp => {
                metrics::record_give_up();
                warn!(attempts = attempt, "retry budget exhausted - giving up");
                self.emit(StreamEvent::Error(StreamError::RetryBudgetExhausted {
                    attempts: attempt,
                }))
                .await;
            }
        }
    }

    // ===== Helpers =====

    fn begin_connect(&mut self) {
        if !self.connection.open() {
            return;
        }

        self.connect_started = Some(Instant::now());
        info!(
            attempt = self.policy.attempt_count(),
            "connecting to price feed"
        );
        self.publish(RetryPhase::Idle);
    }

    async fn send_or_lose(&mut self, frame: OutboundFrame) {
        if let Err(e) = self.send_frame(frame).await {
            self.on_send_failure(&e).await;
        }
    }

    async fn on_send_failure(&mut self, error: &ConnectionError) {
        warn!(error = %error, "send failed");
        if let ConnectionError::Transport(e) = error {
            self.handle_loss(CloseReason::TransportError(e.to_string()))
                .await;
        }
    }

    async fn send_frame(&mut self, frame: OutboundFrame) -> Result<(), ConnectionError> {
        let text = match self.codec.encode_frame(&frame) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to encode frame");
                return Ok(());
            }
        };

        self.connection.send(text).await?;
        metrics::record_subscription_frame(frame.kind);
        debug!(kind = frame.kind.as_str(), count = frame.symbols.len(), "sent frame");
        Ok(())
    }

    fn publish(&self, retry: RetryPhase) {
        let state = self.connection.state();
        metrics::set_connection_state(state);
        self.status.send_replace(StreamStatus {
            state,
            reconnect_attempt: self.policy.attempt_count(),
            retry,
        });
    }

    async fn emit(&mut self, event: StreamEvent) {
        let name = event.name();
        if self.events.send(event).await.is_err() {
            debug!(event = name, "event receiver dropped");
        }
    }
}
