//! Price Cache
//!
//! Latest-value store keyed by symbol. Last write wins by arrival order;
//! nothing is ever evicted.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::domain::streaming::PriceSample;
use crate::domain::subscription::Symbol;

/// Thread-safe map from symbol to its latest [`PriceSample`].
#[derive(Debug, Default)]
pub struct PriceCache {
    samples: RwLock<HashMap<Symbol, PriceSample>>,
}

impl PriceCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the sample for its symbol.
    pub fn upsert(&self, sample: PriceSample) {
        self.samples
            .write()
            .insert(sample.symbol().to_string(), sample);
    }

    /// Look up a batch of symbols.
    ///
    /// Symbols never observed are absent from the result.
    #[must_use]
    pub fn get(&self, symbols: &[Symbol]) -> BTreeMap<Symbol, PriceSample> {
        let samples = self.samples.read();
        symbols
            .iter()
            .filter_map(|symbol| {
                samples
                    .get(symbol)
                    .map(|sample| (symbol.clone(), sample.clone()))
            })
            .collect()
    }

    /// Number of cached symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }
}
