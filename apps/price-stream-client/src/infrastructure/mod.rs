//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the stream client and the concrete implementations
//! of the transport ports defined in the application layer.

/// Price feed client and transports.
pub mod market_feed;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
