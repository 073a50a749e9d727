use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::domain::{CandidateId, CandidateItem, CandidateItemPatch, ProductId};

/// Observer notified after every store mutation. The assembler keeps the
/// committed order current through this seam; UI layers are plain observers
/// with no mutation rights.
pub trait StoreObserver: Send + Sync {
    fn candidates_changed(&self, store: &CandidateItemStore);
}

/// Error raised when an insert collides with an existing id in the same
/// product bucket. Callers surface this as an inline "already added" message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("item {id} is already added for product {product}")]
pub struct DuplicateIdError {
    pub product: ProductId,
    pub id: CandidateId,
}

/// Owns the working set of candidate items for the order being built, keyed
/// by product. The single mutable resource of the workflow engine; one store
/// instance exists per active order session.
#[derive(Default)]
pub struct CandidateItemStore {
    buckets: Mutex<BTreeMap<ProductId, Vec<CandidateItem>>>,
    observers: Mutex<Vec<Arc<dyn StoreObserver>>>,
}

impl CandidateItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn StoreObserver>) {
        lock(&self.observers).push(observer);
    }

    /// Insert a candidate, rejecting (not overwriting) a duplicate id within
    /// the target bucket.
    pub fn insert(&self, mut item: CandidateItem) -> Result<(), DuplicateIdError> {
        item.chosen = item.chosen && item.is_selectable();
        {
            let mut buckets = lock(&self.buckets);
            let bucket = buckets.entry(item.product_id.clone()).or_default();
            if bucket.iter().any(|existing| existing.id == item.id) {
                return Err(DuplicateIdError {
                    product: item.product_id.clone(),
                    id: item.id.clone(),
                });
            }
            bucket.push(item);
        }
        self.notify();
        Ok(())
    }

    /// Apply a partial update. Returns false when the target is absent, which
    /// callers must tolerate silently: a late verification response for a
    /// cleared bucket lands here as a no-op.
    pub fn update(
        &self,
        product_id: &ProductId,
        id: &CandidateId,
        patch: CandidateItemPatch,
    ) -> bool {
        let updated = {
            let mut buckets = lock(&self.buckets);
            let target = buckets
                .get_mut(product_id)
                .and_then(|bucket| bucket.iter_mut().find(|item| &item.id == id));

            match target {
                Some(item) => {
                    if let Some(description) = patch.description {
                        item.description = description;
                    }
                    if let Some(price) = patch.price {
                        item.price = price;
                    }
                    if let Some(verification) = patch.verification {
                        item.verification = verification;
                    }
                    if let Some(render_fields) = patch.render_fields {
                        item.render_fields = render_fields;
                    }
                    if let Some(chosen) = patch.chosen {
                        item.chosen = chosen;
                    }
                    // A pending or hard-failed item can never stay chosen.
                    item.chosen = item.chosen && item.is_selectable();
                    true
                }
                None => {
                    debug!(product = %product_id, id = %id, "update targeted an absent item");
                    false
                }
            }
        };

        if updated {
            self.notify();
        }
        updated
    }

    pub fn remove(&self, product_id: &ProductId, id: &CandidateId) -> bool {
        let removed = {
            let mut buckets = lock(&self.buckets);
            match buckets.get_mut(product_id) {
                Some(bucket) => {
                    let before = bucket.len();
                    bucket.retain(|item| &item.id != id);
                    bucket.len() != before
                }
                None => false,
            }
        };

        if removed {
            self.notify();
        }
        removed
    }

    /// Bulk toggle for "select all" affordances. Items barred from selection
    /// (hard verification errors, in-flight verification) are skipped when
    /// choosing and already unchosen otherwise.
    pub fn set_all_chosen(&self, product_id: &ProductId, chosen: bool) {
        let touched = {
            let mut buckets = lock(&self.buckets);
            match buckets.get_mut(product_id) {
                Some(bucket) => {
                    for item in bucket.iter_mut() {
                        item.chosen = chosen && item.is_selectable();
                    }
                    !bucket.is_empty()
                }
                None => false,
            }
        };

        if touched {
            self.notify();
        }
    }

    /// Read view of one bucket, insertion order preserved.
    pub fn bucket(&self, product_id: &ProductId) -> Vec<CandidateItem> {
        lock(&self.buckets)
            .get(product_id)
            .cloned()
            .unwrap_or_default()
    }

    /// All candidates across buckets, in bucket then insertion order.
    pub fn all_items(&self) -> Vec<CandidateItem> {
        lock(&self.buckets)
            .values()
            .flat_map(|bucket| bucket.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.buckets).values().all(Vec::is_empty)
    }

    /// Wholesale clear, reserved for the transition guard: confirming a
    /// jurisdiction switch abandons every bucket of the old order.
    pub(crate) fn clear_all(&self) {
        lock(&self.buckets).clear();
        self.notify();
    }

    fn notify(&self) {
        let observers: Vec<Arc<dyn StoreObserver>> = lock(&self.observers).clone();
        for observer in observers {
            observer.candidates_changed(self);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
