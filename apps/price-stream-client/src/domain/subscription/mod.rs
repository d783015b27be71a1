//! Subscription Registry
//!
//! The authoritative set of symbols the consumer wants streamed. The registry
//! is purely in-memory: it survives reconnects, is never cleared by a
//! transport failure and never touches the network. The stream client
//! consults it to build incremental frames and the resubscription replay.

use std::collections::{BTreeSet, HashSet};

use crate::domain::streaming::Symbol;

// =============================================================================
// Subscription Registry
// =============================================================================

/// Set of symbols that should currently be streaming.
///
/// # Example
///
/// ```rust
/// use price_stream_client::domain::subscription::SubscriptionRegistry;
///
/// let mut registry = SubscriptionRegistry::new();
///
/// let added = registry.add(&["AAPL".to_string(), "MSFT".to_string()]);
/// assert_eq!(added.len(), 2);
///
/// // Duplicates are ignored
/// assert!(registry.add(&["AAPL".to_string()]).is_empty());
///
/// registry.remove(&["MSFT".to_string()]);
/// assert_eq!(registry.snapshot(), vec!["AAPL".to_string()]);
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscriptionRegistry {
    symbols: BTreeSet<Symbol>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            symbols: BTreeSet::new(),
        }
    }

    /// Insert symbols.
    ///
    /// Returns the symbols that were not already present.
    pub fn add(&mut self, symbols: &[Symbol]) -> Vec<Symbol> {
        symbols
            .iter()
            .filter(|symbol| self.symbols.insert((*symbol).clone()))
            .cloned()
            .collect()
    }

    /// Delete symbols.
    ///
    /// Returns the symbols that were actually present.
    pub fn remove(&mut self, symbols: &[Symbol]) -> Vec<Symbol> {
        symbols
            .iter()
            .filter(|symbol| self.symbols.remove(symbol.as_str()))
            .cloned()
            .collect()
    }

    /// Full current set in sorted order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Symbol> {
        self.symbols.iter().cloned().collect()
    }

    /// Check whether a symbol is registered.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    /// Number of registered symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Check if no symbols are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Remove repeated symbols while keeping first-seen order.
#[must_use]
pub fn dedup_symbols(symbols: impl IntoIterator<Item = Symbol>) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    symbols
        .into_iter()
        .filter(|symbol| seen.insert(symbol.clone()))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
