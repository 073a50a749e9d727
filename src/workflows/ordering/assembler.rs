use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use super::domain::{CandidateItem, Price};
use super::store::{CandidateItemStore, StoreObserver};

/// Derived view of the committed order: the chosen candidates across every
/// bucket plus their count and GST-inclusive total. Recomputed whole on each
/// store change, never diffed.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSnapshot {
    pub committed_items: Vec<CandidateItem>,
    pub item_count: usize,
    pub total_price: Price,
    pub generated_at: DateTime<Utc>,
}

impl Default for OrderSnapshot {
    fn default() -> Self {
        Self {
            committed_items: Vec::new(),
            item_count: 0,
            total_price: Price::ZERO,
            generated_at: Utc::now(),
        }
    }
}

/// Pure deriver over the candidate store. Subscribes to the store and keeps
/// the latest committed-order snapshot; never mutates candidates itself.
#[derive(Default)]
pub struct OrderAssembler {
    snapshot: Mutex<OrderSnapshot>,
}

impl OrderAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn item_count(&self) -> usize {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .item_count
    }

    fn derive(store: &CandidateItemStore) -> OrderSnapshot {
        let committed_items: Vec<CandidateItem> = store
            .all_items()
            .into_iter()
            .filter(|item| item.chosen)
            .collect();

        // The store's insert invariant already forbids duplicate ids within a
        // bucket; re-assert it here before pricing the order.
        let mut seen = BTreeSet::new();
        for item in &committed_items {
            if !seen.insert((item.product_id.clone(), item.id.clone())) {
                error!(
                    product = %item.product_id,
                    id = %item.id,
                    "committed order contains a duplicate line item"
                );
                debug_assert!(false, "duplicate committed line item");
            }
        }

        let total_price = committed_items
            .iter()
            .fold(Price::ZERO, |total, item| total.saturating_add(item.price));

        OrderSnapshot {
            item_count: committed_items.len(),
            committed_items,
            total_price,
            generated_at: Utc::now(),
        }
    }
}

impl StoreObserver for OrderAssembler {
    fn candidates_changed(&self, store: &CandidateItemStore) {
        let snapshot = Self::derive(store);
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}
