use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::catalog::{Region, Service};
use super::domain::{
    CandidateItem, CandidateItemPatch, ProductId, RegionCode, Severity, Verification,
};
use super::store::CandidateItemStore;

/// One element of a batch response. The remote side echoes no identifiers;
/// position in the response array is the only correlation key, so outcomes
/// must arrive in request order and in equal number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// A verified record; projected into render fields via the service's
    /// mapping rules.
    Payload(BTreeMap<String, serde_json::Value>),
    /// A business-level message in place of a record, classified per the
    /// region's error catalog.
    Notification { message: String },
}

/// Failure of the batch call itself, as opposed to a per-item notification
/// inside a successful response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("search transport failure: {0}")]
pub struct TransportFailure(pub String);

/// Seam to the remote search/verify service. The engine treats the call as
/// opaque RPC and never specifies wire framing.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn call(
        &self,
        region: &RegionCode,
        identifier: &str,
        payloads: Vec<BTreeMap<String, serde_json::Value>>,
    ) -> Result<Vec<VerificationOutcome>, TransportFailure>;
}

/// Errors surfaced to the action handler that initiated a batch.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("a verification batch is already in flight for product {0}")]
    BatchInFlight(ProductId),
    #[error(transparent)]
    Transport(#[from] TransportFailure),
}

/// Summary counts handed back to the initiating caller for user messaging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub requested: usize,
    pub verified: usize,
    pub warnings: usize,
    pub errors: usize,
}

/// Issues one batch verification call per product bucket and distributes the
/// positionally-correlated outcomes back into the candidate store.
pub struct VerificationCoordinator<T> {
    transport: Arc<T>,
    in_flight: Mutex<BTreeSet<ProductId>>,
}

impl<T: SearchTransport> VerificationCoordinator<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            in_flight: Mutex::new(BTreeSet::new()),
        }
    }

    /// The shared transport, for callers issuing non-batch search calls.
    pub(crate) fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Verify `items` against the remote service in one batch. The outgoing
    /// payloads preserve the order of `items`; the response is applied back
    /// by position. The store stays the durable owner: results land in the
    /// bucket regardless of what happens to the initiating caller, and a
    /// bucket cleared mid-flight absorbs them as silent no-ops.
    pub async fn verify(
        &self,
        store: &CandidateItemStore,
        region: &Region,
        service: &Service,
        items: Vec<CandidateItem>,
    ) -> Result<BatchReport, VerificationError> {
        if items.is_empty() {
            return Ok(BatchReport::default());
        }

        let _slot = self.claim_bucket(service.product_id.clone())?;

        for item in &items {
            store.update(
                &item.product_id,
                &item.id,
                CandidateItemPatch::verification(Verification::pending()),
            );
        }

        let payloads: Vec<BTreeMap<String, serde_json::Value>> =
            items.iter().map(|item| item.raw_inputs.clone()).collect();

        let outcomes = match self
            .transport
            .call(&region.code, &service.identifier, payloads)
            .await
        {
            Ok(outcomes) if outcomes.len() == items.len() => outcomes,
            Ok(outcomes) => {
                self.roll_back(store, &items);
                return Err(TransportFailure(format!(
                    "sent {} requests but received {} outcomes",
                    items.len(),
                    outcomes.len()
                ))
                .into());
            }
            Err(failure) => {
                warn!(
                    region = %region.code,
                    identifier = %service.identifier,
                    error = %failure,
                    "verification batch failed in transport"
                );
                self.roll_back(store, &items);
                return Err(failure.into());
            }
        };

        let mut report = BatchReport {
            requested: items.len(),
            ..BatchReport::default()
        };

        for (item, outcome) in items.iter().zip(outcomes) {
            let patch = match outcome {
                VerificationOutcome::Notification { message } => {
                    let severity = region.classify(&message);
                    match severity {
                        Severity::Error => report.errors += 1,
                        Severity::Warning => report.warnings += 1,
                    }
                    CandidateItemPatch {
                        verification: Some(Verification::failed(severity, message)),
                        chosen: Some(false),
                        ..CandidateItemPatch::default()
                    }
                }
                VerificationOutcome::Payload(payload) => {
                    report.verified += 1;
                    CandidateItemPatch {
                        verification: Some(Verification::verified()),
                        render_fields: Some(service.project_payload(&payload)),
                        chosen: Some(true),
                        ..CandidateItemPatch::default()
                    }
                }
            };

            if !store.update(&item.product_id, &item.id, patch) {
                debug!(
                    product = %item.product_id,
                    id = %item.id,
                    "verification outcome arrived for a removed candidate"
                );
            }
        }

        info!(
            region = %region.code,
            identifier = %service.identifier,
            requested = report.requested,
            verified = report.verified,
            warnings = report.warnings,
            errors = report.errors,
            "verification batch applied"
        );

        Ok(report)
    }

    /// No partial application on transport-level failure: every targeted item
    /// still present returns to unverified.
    fn roll_back(&self, store: &CandidateItemStore, items: &[CandidateItem]) {
        for item in items {
            store.update(
                &item.product_id,
                &item.id,
                CandidateItemPatch::verification(Verification::unverified()),
            );
        }
    }

    fn claim_bucket(&self, product_id: ProductId) -> Result<InFlightSlot<'_>, VerificationError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(product_id.clone()) {
            return Err(VerificationError::BatchInFlight(product_id));
        }
        Ok(InFlightSlot {
            set: &self.in_flight,
            product_id,
        })
    }
}

/// Releases the per-bucket batch slot when the verify call completes,
/// whichever way it resolves.
struct InFlightSlot<'a> {
    set: &'a Mutex<BTreeSet<ProductId>>,
    product_id: ProductId,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.product_id);
    }
}
