//! Application Layer - Port definitions and consumer-facing services.
//!
//! This layer defines the transport contract the stream client depends on
//! and the observer services consumers use to react to stream events.

/// Port interfaces for the transport collaborator.
pub mod ports;

/// Consumer-side event dispatch services.
pub mod services;
