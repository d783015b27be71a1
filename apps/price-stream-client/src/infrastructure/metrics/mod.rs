//! Prometheus Metrics Module
//!
//! Exposes stream client metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Counts of frames received and sent by type
//! - **Connection**: Current connection state and handshake latency
//! - **Reconnection**: Scheduled retries and exhausted budgets
//! - **Subscriptions**: Registry size
//!
//! # Integration
//!
//! Recording functions are no-ops until a recorder is installed, so the
//! client library can call them unconditionally. The binary installs the
//! exporter when `PRICE_STREAM_METRICS_PORT` is non-zero; metrics are then
//! served at `/metrics` on that port.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::domain::streaming::{ConnectionState, FrameKind};

// =============================================================================
// Exporter Installation
// =============================================================================

static METRICS_ADDR: OnceLock<SocketAddr> = OnceLock::new();

/// Errors raised while installing the exporter.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The recorder or its HTTP listener could not be installed.
    #[error("failed to install Prometheus exporter: {0}")]
    Install(#[from] BuildError),
}

/// Install the Prometheus recorder and its HTTP listener on `port`.
///
/// Must be called from within a Tokio runtime. Calling it again after a
/// successful install returns the address already in use.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics(port: u16) -> Result<SocketAddr, MetricsError> {
    if let Some(addr) = METRICS_ADDR.get() {
        return Ok(*addr);
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metrics();

    Ok(*METRICS_ADDR.get_or_init(|| addr))
}

/// Address of the metrics listener, if one was installed.
#[must_use]
pub fn metrics_addr() -> Option<SocketAddr> {
    METRICS_ADDR.get().copied()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Frame counters
    describe_counter!(
        "price_stream_frames_received_total",
        "Total inbound frames decoded, by message type"
    );
    describe_counter!(
        "price_stream_decode_failures_total",
        "Total inbound frames discarded as malformed"
    );
    describe_counter!(
        "price_stream_frames_sent_total",
        "Total outbound frames written, by frame type"
    );
    describe_counter!(
        "price_stream_sends_dropped_total",
        "Total sends attempted while not connected"
    );

    // Connection gauges
    describe_gauge!(
        "price_stream_connection_state",
        "Current connection state (0=disconnected, 1=connecting, 2=connected, 3=errored)"
    );
    describe_histogram!(
        "price_stream_connect_seconds",
        "Time from opening an attempt to the connection being established"
    );

    // Reconnection counters
    describe_counter!(
        "price_stream_reconnects_total",
        "Total reconnection attempts scheduled"
    );
    describe_counter!(
        "price_stream_give_ups_total",
        "Total times the retry budget was exhausted"
    );

    // Subscription gauges
    describe_gauge!(
        "price_stream_subscribed_symbols",
        "Number of symbols in the subscription registry"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

const fn state_value(state: ConnectionState) -> f64 {
    match state {
        ConnectionState::Disconnected => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Connected => 2.0,
        ConnectionState::Errored => 3.0,
    }
}

/// Record a decoded inbound frame.
pub fn record_frame_received(kind: &'static str) {
    counter!("price_stream_frames_received_total", "kind" => kind).increment(1);
}

/// Record an inbound frame that failed to decode.
pub fn record_decode_failure(reason: &'static str) {
    counter!("price_stream_decode_failures_total", "reason" => reason).increment(1);
}

/// Record an outbound frame written to the transport.
pub fn record_frame_sent(kind: &'static str) {
    counter!("price_stream_frames_sent_total", "kind" => kind).increment(1);
}

/// Record an outbound subscription frame.
pub fn record_subscription_frame(kind: FrameKind) {
    record_frame_sent(kind.as_str());
}

/// Record a send dropped because the connection was not open.
pub fn record_send_dropped() {
    counter!("price_stream_sends_dropped_total").increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("price_stream_connection_state").set(state_value(state));
}

/// Record how long a successful handshake took.
pub fn record_connect_duration(duration: Duration) {
    histogram!("price_stream_connect_seconds").record(duration.as_secs_f64());
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect() {
    counter!("price_stream_reconnects_total").increment(1);
}

/// Record an exhausted retry budget.
pub fn record_give_up() {
    counter!("price_stream_give_ups_total").increment(1);
}

/// Update the subscribed symbol count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribed_symbols(count: usize) {
    gauge!("price_stream_subscribed_symbols").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================
