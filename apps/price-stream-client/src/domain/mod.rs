//! Domain Layer - Core streaming types and subscription state.
//!
//! This layer contains the wire-level data model of the price feed, the
//! events and status the consumer observes, and the authoritative set of
//! subscribed symbols. Nothing here performs I/O.

/// Stream events and observable status.
pub mod lifecycle;

/// Price feed data types (inbound messages, outbound frames, connection state).
pub mod streaming;

/// Subscription registry.
pub mod subscription;
