//! Price Stream Client Binary
//!
//! Connects to the price feed, subscribes to the configured symbols and
//! logs every update until interrupted.
//!
//! # Usage
//!
//! ```bash
//! PRICE_STREAM_SYMBOLS=AAPL,MSFT cargo run --bin price-stream-client
//! ```
//!
//! # Environment Variables
//!
//! - `PRICE_STREAM_URL`: absolute `ws://`/`wss://` URL or a path (default: /ws/prices)
//! - `PRICE_STREAM_BASE_URL`: base URL for relative paths (default: ws://localhost:8000)
//! - `PRICE_STREAM_SYMBOLS`: comma-separated symbols to subscribe at startup
//! - `PRICE_STREAM_RECONNECT_ATTEMPTS`: automatic reconnect attempts (default: 5)
//! - `PRICE_STREAM_RECONNECT_INTERVAL_MS`: delay between attempts (default: 3000)
//! - `PRICE_STREAM_METRICS_PORT`: Prometheus metrics port (default: 0, disabled)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `RUST_LOG`: Log filter (default: price_stream_client=info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use price_stream_client::application::services::{LatestPrices, StreamHandler, dispatch_events};
use price_stream_client::infrastructure::telemetry;
use price_stream_client::{
    AppConfig, CloseReason, InboundMessage, StreamClient, StreamError, WebSocketConnector,
    init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Ignored when a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    load_dotenv();

    // Initialize telemetry (tracing + optional OpenTelemetry)
    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    let config = AppConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    if config.metrics_port > 0 {
        let addr = init_metrics(config.metrics_port).context("failed to start metrics exporter")?;
        tracing::info!(%addr, "Prometheus metrics exporter listening");
    }

    let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
    let client = StreamClient::spawn(
        config.client_config(),
        Arc::new(WebSocketConnector::new()),
        event_tx,
    );
    let dispatcher = tokio::spawn(dispatch_events(event_rx, LoggingHandler::default()));

    if !config.symbols.is_empty() {
        client.subscribe(config.symbols.iter().cloned())?;
    }
    client.connect()?;

    await_shutdown().await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, client.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "stream client did not stop in time"
        );
    }

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, dispatcher).await {
        Ok(Ok(handler)) => {
            tracing::info!(
                updates = handler.prices.updates(),
                symbols = handler.prices.prices().len(),
                "Price stream client stopped"
            );
        }
        Ok(Err(e)) => tracing::error!(error = %e, "event dispatcher failed"),
        Err(_) => tracing::warn!("event dispatcher did not stop in time"),
    }

    Ok(())
}

/// Logs stream events and keeps the latest prices.
#[derive(Debug, Default)]
struct LoggingHandler {
    prices: LatestPrices,
}

impl StreamHandler for LoggingHandler {
    fn on_open(&mut self) {
        tracing::info!("Price stream open");
    }

    fn on_message(&mut self, message: &InboundMessage) {
        match message {
            InboundMessage::PriceUpdate { prices, timestamp } => {
                for (symbol, price) in prices {
                    tracing::info!(%symbol, %price, ?timestamp, "price update");
                }
            }
            InboundMessage::SubscriptionAck { symbols } => {
                tracing::info!(?symbols, "subscription confirmed");
            }
            InboundMessage::UnsubscriptionAck { symbols } => {
                tracing::info!(?symbols, "unsubscription confirmed");
            }
        }
        self.prices.on_message(message);
    }

    fn on_close(&mut self, reason: &CloseReason) {
        tracing::info!(%reason, "Price stream closed");
    }

    fn on_error(&mut self, error: &StreamError) {
        tracing::error!(%error, "Price stream error");
    }

    fn on_reconnecting(&mut self, attempt: u32, delay: Duration) {
        tracing::info!(attempt, delay_ms = delay.as_millis(), "Reconnecting");
    }
}

/// Log the parsed configuration.
fn log_config(config: &AppConfig) {
    tracing::info!(
        endpoint = %config.stream.endpoint(),
        symbols = ?config.symbols,
        reconnect_attempts = config.stream.reconnect.max_attempts,
        reconnect_interval_ms = config.stream.reconnect.interval.as_millis(),
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
