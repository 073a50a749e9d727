use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::assembler::{OrderAssembler, OrderSnapshot};
use super::catalog::{RegionCatalog, Service};
use super::domain::{
    CandidateId, CandidateItem, CandidateItemPatch, FulfillmentKind, Price, ProductId, RegionCode,
    Verification, VerificationState,
};
use super::pager;
use super::store::{CandidateItemStore, DuplicateIdError};
use super::transition::{GuardState, SwitchOutcome, SwitchRequest, TransitionGuard};
use super::verification::{
    BatchReport, SearchTransport, VerificationCoordinator, VerificationError, VerificationOutcome,
};

/// The jurisdiction and service the session is currently ordering against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionLocation {
    pub region: RegionCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ProductId>,
}

/// Inbound shape for a manually entered candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCandidate {
    pub product_id: ProductId,
    pub id: CandidateId,
    pub description: String,
    #[serde(default)]
    pub raw_inputs: BTreeMap<String, serde_json::Value>,
    /// Falls back to the service's listed price when absent.
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub chosen: bool,
}

/// Errors surfaced by session operations to the initiating caller.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("unknown region {0}")]
    UnknownRegion(RegionCode),
    #[error("region {region} does not offer product {product}")]
    UnknownService {
        region: RegionCode,
        product: ProductId,
    },
    #[error(transparent)]
    Duplicate(#[from] DuplicateIdError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
}

/// One order-construction session: a candidate store, its derived order
/// snapshot, the verification coordinator, and the transition guard, wired
/// together behind a single facade. UI layers and the HTTP router talk only
/// to this type.
pub struct OrderSession<T> {
    catalog: Arc<RegionCatalog>,
    store: Arc<CandidateItemStore>,
    assembler: Arc<OrderAssembler>,
    coordinator: VerificationCoordinator<T>,
    guard: TransitionGuard,
    location: Mutex<SessionLocation>,
}

impl<T: SearchTransport> OrderSession<T> {
    pub fn new(
        catalog: Arc<RegionCatalog>,
        transport: Arc<T>,
        region: RegionCode,
    ) -> Result<Self, OrderError> {
        if catalog.region(&region).is_none() {
            return Err(OrderError::UnknownRegion(region));
        }

        let store = Arc::new(CandidateItemStore::new());
        let assembler = Arc::new(OrderAssembler::new());
        store.subscribe(assembler.clone());

        Ok(Self {
            catalog,
            guard: TransitionGuard::new(store.clone()),
            coordinator: VerificationCoordinator::new(transport),
            store,
            assembler,
            location: Mutex::new(SessionLocation {
                region,
                service: None,
            }),
        })
    }

    pub fn location(&self) -> SessionLocation {
        self.location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn guard_state(&self) -> GuardState {
        self.guard.state()
    }

    /// Latest committed-order snapshot: chosen items, count, and total.
    pub fn order(&self) -> OrderSnapshot {
        self.assembler.snapshot()
    }

    pub fn bucket(&self, product_id: &ProductId) -> Vec<CandidateItem> {
        self.store.bucket(product_id)
    }

    /// One page of a bucket, using the portal's clamp-to-first-page rule.
    pub fn bucket_page(
        &self,
        product_id: &ProductId,
        page_index: usize,
        page_size: usize,
    ) -> Vec<CandidateItem> {
        let items = self.store.bucket(product_id);
        pager::page(&items, page_index, page_size).to_vec()
    }

    /// Add a user-entered candidate to its product bucket. A colliding id is
    /// rejected and reported as an "already added" condition, never retried.
    pub fn add_manual_item(&self, new: NewCandidate) -> Result<CandidateItem, OrderError> {
        let region_code = self.location().region;
        let service = self.resolve_service(&region_code, &new.product_id)?.clone();

        let item = CandidateItem {
            id: new.id,
            product_id: new.product_id,
            identifier: service.identifier.clone(),
            description: new.description,
            chosen: new.chosen,
            fulfillment: service.fulfillment,
            price: new.price.unwrap_or(service.price_incl_gst),
            render_fields: BTreeMap::new(),
            verification: Verification::unverified(),
            raw_inputs: new.raw_inputs,
            added_at: Utc::now(),
        };

        self.store.insert(item.clone())?;
        Ok(item)
    }

    /// Run the service's remote search and insert each returned record as a
    /// verified, unchosen candidate. Records already present (same id) are
    /// skipped; notifications in a search response are logged and dropped.
    /// Returns the number of candidates inserted.
    pub async fn search(
        &self,
        product_id: &ProductId,
        criteria: BTreeMap<String, serde_json::Value>,
    ) -> Result<usize, OrderError> {
        let region_code = self.location().region;
        let region = self
            .catalog
            .region(&region_code)
            .ok_or_else(|| OrderError::UnknownRegion(region_code.clone()))?;
        let service = self.resolve_service(&region_code, product_id)?.clone();

        let outcomes = self
            .coordinator
            .transport()
            .call(&region.code, &service.identifier, vec![criteria.clone()])
            .await
            .map_err(VerificationError::from)?;

        let mut inserted = 0;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            let payload = match outcome {
                VerificationOutcome::Payload(payload) => payload,
                VerificationOutcome::Notification { message } => {
                    warn!(product = %product_id, %message, "search returned a notification");
                    continue;
                }
            };

            let id = payload
                .get("id")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("{}-{}", service.identifier, index + 1));
            let description = payload
                .get("description")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| id.clone());

            let item = CandidateItem {
                id: CandidateId(id),
                product_id: product_id.clone(),
                identifier: service.identifier.clone(),
                description,
                chosen: false,
                fulfillment: service.fulfillment,
                price: service.price_incl_gst,
                render_fields: service.project_payload(&payload),
                verification: Verification::verified(),
                raw_inputs: criteria.clone(),
                added_at: Utc::now(),
            };

            match self.store.insert(item) {
                Ok(()) => inserted += 1,
                Err(duplicate) => {
                    debug!(%duplicate, "search result already present, skipped");
                }
            }
        }

        Ok(inserted)
    }

    /// Issue one verification batch for the bucket's automatic candidates
    /// that still need a remote check (unverified or previously failed).
    pub async fn verify_bucket(&self, product_id: &ProductId) -> Result<BatchReport, OrderError> {
        let region_code = self.location().region;
        let region = self
            .catalog
            .region(&region_code)
            .ok_or_else(|| OrderError::UnknownRegion(region_code.clone()))?
            .clone();
        let service = self.resolve_service(&region_code, product_id)?.clone();

        if service.fulfillment == FulfillmentKind::Manual {
            return Ok(BatchReport::default());
        }

        let items: Vec<CandidateItem> = self
            .store
            .bucket(product_id)
            .into_iter()
            .filter(|item| {
                matches!(
                    item.verification.state,
                    VerificationState::Unverified | VerificationState::Failed
                )
            })
            .collect();

        let report = self
            .coordinator
            .verify(&self.store, &region, &service, items)
            .await?;
        Ok(report)
    }

    pub fn set_chosen(&self, product_id: &ProductId, id: &CandidateId, chosen: bool) -> bool {
        self.store
            .update(product_id, id, CandidateItemPatch::chosen(chosen))
    }

    pub fn set_all_chosen(&self, product_id: &ProductId, chosen: bool) {
        self.store.set_all_chosen(product_id, chosen);
    }

    pub fn remove_item(&self, product_id: &ProductId, id: &CandidateId) -> bool {
        self.store.remove(product_id, id)
    }

    /// Request a jurisdiction/service switch. Applies immediately when the
    /// committed order is empty; otherwise the guard parks it until the user
    /// confirms or cancels.
    pub fn request_switch(&self, request: SwitchRequest) -> Result<SwitchOutcome, OrderError> {
        self.validate_target(&request)?;

        let outcome = self
            .guard
            .request_switch(request, self.assembler.item_count());
        if let SwitchOutcome::Applied(applied) = &outcome {
            self.apply_location(applied);
        }
        Ok(outcome)
    }

    /// Confirm the parked switch: clears the abandoned order, applies the
    /// target, and re-seeds any carried-over search context into the new
    /// jurisdiction's bucket.
    ///
    /// Panics when no switch is awaiting confirmation.
    pub fn confirm_switch(&self) -> SwitchRequest {
        let Some(request) = self.try_confirm_switch() else {
            panic!("confirm_switch called with no switch awaiting confirmation");
        };
        request
    }

    /// Non-panicking confirm for surfaces exposed to double submits.
    pub fn try_confirm_switch(&self) -> Option<SwitchRequest> {
        let request = self.guard.confirm_if_pending()?;
        self.apply_location(&request);

        if let Some(context) = &request.carry_over {
            self.reseed(&request.region, context);
        }

        Some(request)
    }

    /// Discard the parked switch, leaving all candidate state untouched.
    ///
    /// Panics when no switch is awaiting confirmation.
    pub fn cancel_switch(&self) {
        self.guard.cancel();
    }

    /// Non-panicking cancel; returns false when nothing is parked.
    pub fn try_cancel_switch(&self) -> bool {
        self.guard.cancel_if_pending()
    }

    fn reseed(&self, region: &RegionCode, context: &super::transition::CarriedContext) {
        let Some(service) = self.catalog.service(region, &context.product_id) else {
            warn!(
                region = %region,
                product = %context.product_id,
                "carried-over context has no service in the new region, dropped"
            );
            return;
        };

        let item = CandidateItem {
            id: context.id.clone(),
            product_id: context.product_id.clone(),
            identifier: service.identifier.clone(),
            description: context.description.clone(),
            chosen: false,
            fulfillment: service.fulfillment,
            price: service.price_incl_gst,
            render_fields: BTreeMap::new(),
            verification: Verification::unverified(),
            raw_inputs: context.raw_inputs.clone(),
            added_at: Utc::now(),
        };

        if let Err(duplicate) = self.store.insert(item) {
            // The buckets were just cleared, so this only fires on a
            // double-confirm race; nothing to recover.
            debug!(%duplicate, "carry-over re-seed collided, skipped");
        }
    }

    fn apply_location(&self, request: &SwitchRequest) {
        let mut location = self.location.lock().unwrap_or_else(PoisonError::into_inner);
        location.region = request.region.clone();
        location.service = request.service.clone();
    }

    fn resolve_service(
        &self,
        region: &RegionCode,
        product_id: &ProductId,
    ) -> Result<&Service, OrderError> {
        self.catalog
            .region(region)
            .ok_or_else(|| OrderError::UnknownRegion(region.clone()))?
            .service(product_id)
            .ok_or_else(|| OrderError::UnknownService {
                region: region.clone(),
                product: product_id.clone(),
            })
    }

    fn validate_target(&self, request: &SwitchRequest) -> Result<(), OrderError> {
        let region = self
            .catalog
            .region(&request.region)
            .ok_or_else(|| OrderError::UnknownRegion(request.region.clone()))?;

        if let Some(product_id) = &request.service {
            if region.service(product_id).is_none() {
                return Err(OrderError::UnknownService {
                    region: request.region.clone(),
                    product: product_id.clone(),
                });
            }
        }
        Ok(())
    }
}
