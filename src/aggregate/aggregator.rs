//! Running per-product mean

use crate::feed::PriceEvent;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Aggregate for one product
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateState {
    /// Events observed, always at least 1 for a stored entry
    pub count: u64,
    /// Incremental mean of observed prices
    pub mean: f64,
}

/// Thread-safe running mean keyed by product id.
///
/// One lock covers the whole map; the product set is small (tens of keys).
#[derive(Debug, Default)]
pub struct StreamingAggregator {
    state: Mutex<HashMap<String, AggregateState>>,
}

impl StreamingAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into its product's mean, returning the new state.
    ///
    /// The lookup, count increment and mean update happen under a single
    /// lock acquisition.
    pub fn update(&self, event: &PriceEvent) -> AggregateState {
        let mut state = self.state.lock();

        match state.get_mut(&event.product_id) {
            Some(entry) => {
                entry.count += 1;
                entry.mean = next_mean(entry.mean, event.price, entry.count);
                *entry
            }
            None => {
                let entry = AggregateState {
                    count: 1,
                    mean: event.price,
                };
                state.insert(event.product_id.clone(), entry);
                entry
            }
        }
    }

    /// Current mean for `product_id`, `None` if it has never been seen
    pub fn query(&self, product_id: &str) -> Option<f64> {
        self.state.lock().get(product_id).map(|s| s.mean)
    }

    /// Events seen for `product_id`, 0 if it has never been seen
    pub fn query_count(&self, product_id: &str) -> u64 {
        self.state.lock().get(product_id).map_or(0, |s| s.count)
    }

    /// Consistent copy of every product's state, ordered by product id
    pub fn snapshot(&self) -> BTreeMap<String, AggregateState> {
        self.state
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Number of distinct products seen
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().is_empty()
    }
}

/// `mean + (price - mean) / count`, splitting the division when the
/// difference of two finite values overflows
fn next_mean(mean: f64, price: f64, count: u64) -> f64 {
    let n = count as f64;
    let delta = price - mean;
    if delta.is_finite() {
        mean + delta / n
    } else {
        mean - mean / n + price / n
    }
}
