//! Application Services
//!
//! Consumer-side observers of the stream. The stream client delivers
//! [`StreamEvent`]s on a channel; [`dispatch_events`] drains that channel
//! into a [`StreamHandler`], one callback per event, in receipt order.
//!
//! - `StreamHandler`: per-event callbacks with no-op defaults
//! - `LatestPrices`: keeps the most recent price per symbol

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::domain::lifecycle::{CloseReason, StreamError, StreamEvent};
use crate::domain::streaming::{InboundMessage, Symbol};

/// Callbacks invoked for stream events.
///
/// Every method defaults to doing nothing, so handlers only implement the
/// events they care about.
pub trait StreamHandler: Send {
    /// The connection opened.
    fn on_open(&mut self) {}

    /// A well-formed server frame arrived.
    fn on_message(&mut self, message: &InboundMessage) {
        let _ = message;
    }

    /// The connection closed.
    fn on_close(&mut self, reason: &CloseReason) {
        let _ = reason;
    }

    /// An error was reported.
    fn on_error(&mut self, error: &StreamError) {
        let _ = error;
    }

    /// A reconnect attempt was scheduled.
    fn on_reconnecting(&mut self, attempt: u32, delay: Duration) {
        let _ = (attempt, delay);
    }

    /// Route one event to the matching callback.
    fn handle(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Opened => self.on_open(),
            StreamEvent::Message(message) => self.on_message(message),
            StreamEvent::Closed { reason } => self.on_close(reason),
            StreamEvent::Reconnecting { attempt, delay } => self.on_reconnecting(*attempt, *delay),
            StreamEvent::Error(error) => self.on_error(error),
        }
    }
}

/// Deliver events to `handler` until the channel closes, then return it.
pub async fn dispatch_events<H: StreamHandler>(
    mut events: mpsc::Receiver<StreamEvent>,
    mut handler: H,
) -> H {
    while let Some(event) = events.recv().await {
        handler.handle(&event);
    }
    handler
}

/// Most recent price per symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatestPrices {
    prices: BTreeMap<Symbol, Decimal>,
    last_update: Option<DateTime<Utc>>,
    updates: u64,
}

impl LatestPrices {
    /// Create an empty price table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest price for `symbol`.
    #[must_use]
    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }

    /// All known prices, ordered by symbol.
    #[must_use]
    pub const fn prices(&self) -> &BTreeMap<Symbol, Decimal> {
        &self.prices
    }

    /// Server timestamp of the latest update that carried one.
    #[must_use]
    pub const fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Number of price updates applied.
    #[must_use]
    pub const fn updates(&self) -> u64 {
        self.updates
    }

    /// Apply one price update.
    pub fn apply(&mut self, prices: &BTreeMap<Symbol, Decimal>, timestamp: Option<DateTime<Utc>>) {
        self.prices
            .extend(prices.iter().map(|(symbol, price)| (symbol.clone(), *price)));
        if timestamp.is_some() {
            self.last_update = timestamp;
        }
        self.updates += 1;
    }
}

impl StreamHandler for LatestPrices {
    fn on_message(&mut self, message: &InboundMessage) {
        if let InboundMessage::PriceUpdate { prices, timestamp } = message {
            self.apply(prices, *timestamp);
        }
    }

    fn on_close(&mut self, reason: &CloseReason) {
        tracing::debug!(reason = %reason, symbols = self.prices.len(), "price table kept across closure");
    }
}
