//! Subscription Management Types
//!
//! Domain types for tracking which symbols the proxy wants streamed and which
//! symbols the current upstream session is believed to carry.
//!
//! # Design
//!
//! The subscription book tracks three sets:
//! - **Desired**: everything callers asked for, independent of connection state
//! - **Active**: what the current upstream session has been sent (optimistic)
//! - **Pending**: subscribe intents issued while no session was connected
//!
//! Every mutation returns the minimal delta that has to go upstream, so many
//! callers subscribing to the same symbol collapse into a single upstream add.

use std::collections::BTreeSet;

// =============================================================================
// Types
// =============================================================================

/// A normalized symbol string (e.g. `AAPL`, `BTC/USD`).
pub type Symbol = String;

/// Normalize a raw symbol: trim whitespace and uppercase.
///
/// Returns `None` for input that is empty after trimming.
#[must_use]
pub fn normalize_symbol(raw: &str) -> Option<Symbol> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Normalize a batch of raw symbols, dropping empties and duplicates.
///
/// First occurrence wins, so the output keeps caller order.
pub fn normalize_symbols<I, S>(raw: I) -> Vec<Symbol>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = BTreeSet::new();
    raw.into_iter()
        .filter_map(|s| normalize_symbol(s.as_ref()))
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

// =============================================================================
// Subscription Book
// =============================================================================

/// Desired, active and pending symbol sets for a single upstream connection.
///
/// Not thread-safe on its own; the connection manager serializes access.
///
/// # Example
///
/// ```rust
/// use price_stream_proxy::domain::subscription::SubscriptionBook;
///
/// let mut book = SubscriptionBook::new();
///
/// // Requested before the connection is up - queued
/// book.subscribe_offline(&["AAPL".to_string()]);
/// assert_eq!(book.pending(), vec!["AAPL".to_string()]);
///
/// // Session comes up - the queue is flushed as one batch
/// let batch = book.on_session_connected(true);
/// assert_eq!(batch, vec!["AAPL".to_string()]);
/// assert!(book.pending().is_empty());
///
/// // Already active - nothing to send
/// assert!(book.subscribe_connected(&["AAPL".to_string()]).is_empty());
/// ```
#[derive(Debug, Default, Clone)]
pub struct SubscriptionBook {
    desired: BTreeSet<Symbol>,
    active: BTreeSet<Symbol>,
    pending: BTreeSet<Symbol>,
}

impl SubscriptionBook {
    /// Create an empty subscription book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record subscribe intents while no session is connected.
    ///
    /// Symbols join both the desired set and the pending queue.
    pub fn subscribe_offline(&mut self, symbols: &[Symbol]) {
        for symbol in symbols {
            self.desired.insert(symbol.clone());
            self.pending.insert(symbol.clone());
        }
    }

    /// Record subscribe intents against a connected session.
    ///
    /// Returns the symbols that need an upstream subscribe (not yet active).
    /// They are marked active immediately, before any acknowledgement.
    pub fn subscribe_connected(&mut self, symbols: &[Symbol]) -> Vec<Symbol> {
        let mut to_add = Vec::new();

        for symbol in symbols {
            self.desired.insert(symbol.clone());
            if self.active.insert(symbol.clone()) {
                to_add.push(symbol.clone());
            }
        }

        to_add
    }

    /// Drop symbols from the desired set and the pending queue.
    ///
    /// When `connected`, returns the symbols that need an upstream
    /// unsubscribe (those currently active) and removes them from the
    /// active set. When disconnected nothing is sent upstream.
    pub fn unsubscribe(&mut self, symbols: &[Symbol], connected: bool) -> Vec<Symbol> {
        for symbol in symbols {
            self.desired.remove(symbol);
            self.pending.remove(symbol);
        }

        if !connected {
            return Vec::new();
        }

        symbols
            .iter()
            .filter(|symbol| self.active.remove(symbol.as_str()))
            .cloned()
            .collect()
    }

    /// Reset for a freshly connected session.
    ///
    /// The active set is cleared (server-side subscriptions do not survive a
    /// reconnect) and the pending queue is drained. Returns the batch to
    /// subscribe, which is then marked active:
    ///
    /// - with `resubscribe_desired`, the whole desired set
    /// - otherwise, only the drained pending symbols
    pub fn on_session_connected(&mut self, resubscribe_desired: bool) -> Vec<Symbol> {
        self.active.clear();
        let drained = std::mem::take(&mut self.pending);

        let batch: Vec<Symbol> = if resubscribe_desired {
            self.desired.iter().cloned().collect()
        } else {
            drained.into_iter().collect()
        };

        self.active.extend(batch.iter().cloned());
        batch
    }

    /// Remove symbols the upstream refused from the active set.
    ///
    /// Returns the symbols that were actually active.
    pub fn reject(&mut self, symbols: &[Symbol]) -> Vec<Symbol> {
        symbols
            .iter()
            .filter(|symbol| self.active.remove(symbol.as_str()))
            .cloned()
            .collect()
    }

    /// Symbols believed active on the current session, sorted.
    #[must_use]
    pub fn active(&self) -> Vec<Symbol> {
        self.active.iter().cloned().collect()
    }

    /// Symbols waiting for a connected session, sorted.
    #[must_use]
    pub fn pending(&self) -> Vec<Symbol> {
        self.pending.iter().cloned().collect()
    }

    /// All desired symbols, sorted.
    #[must_use]
    pub fn desired(&self) -> Vec<Symbol> {
        self.desired.iter().cloned().collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
