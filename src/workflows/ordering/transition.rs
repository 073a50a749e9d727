use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::domain::{CandidateId, ProductId, RegionCode};
use super::store::CandidateItemStore;

/// Search context carried across a confirmed switch, e.g. a global search
/// origin whose criteria are re-seeded into the new jurisdiction's bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarriedContext {
    pub product_id: ProductId,
    pub id: CandidateId,
    pub description: String,
    #[serde(default)]
    pub raw_inputs: BTreeMap<String, serde_json::Value>,
}

/// A requested jurisdiction/service change awaiting application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchRequest {
    pub region: RegionCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ProductId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carry_over: Option<CarriedContext>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    Idle,
    AwaitingConfirmation,
}

impl GuardState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::AwaitingConfirmation => "Awaiting Confirmation",
        }
    }
}

/// Result of a switch request: applied straight away, or parked behind the
/// confirmation gate because the current order holds committed items.
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchOutcome {
    Applied(SwitchRequest),
    AwaitingConfirmation,
}

/// Confirmation gate preventing silent loss of in-progress order state when
/// the user changes jurisdiction or service. The only component permitted to
/// clear the store's buckets wholesale.
pub struct TransitionGuard {
    store: Arc<CandidateItemStore>,
    pending: Mutex<Option<SwitchRequest>>,
}

impl TransitionGuard {
    pub fn new(store: Arc<CandidateItemStore>) -> Self {
        Self {
            store,
            pending: Mutex::new(None),
        }
    }

    pub fn state(&self) -> GuardState {
        if self.pending().is_some() {
            GuardState::AwaitingConfirmation
        } else {
            GuardState::Idle
        }
    }

    pub fn pending(&self) -> Option<SwitchRequest> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Request a jurisdiction/service change. With no committed items the
    /// change applies immediately; otherwise the request is parked until the
    /// user confirms or cancels. A repeat request while one is parked
    /// replaces it: last request wins, no queueing.
    pub fn request_switch(&self, request: SwitchRequest, item_count: usize) -> SwitchOutcome {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);

        if pending.is_none() && item_count == 0 {
            return SwitchOutcome::Applied(request);
        }

        if pending.replace(request).is_some() {
            debug!("replaced pending switch request; last request wins");
        }
        SwitchOutcome::AwaitingConfirmation
    }

    /// Apply the parked switch: every bucket of the abandoned order is
    /// cleared and the target is handed back for the session to apply.
    ///
    /// Calling this with nothing parked is a programming error and panics.
    pub fn confirm(&self) -> SwitchRequest {
        self.confirm_if_pending().unwrap_or_else(|| {
            panic!("TransitionGuard::confirm called with no switch awaiting confirmation")
        })
    }

    /// Atomic confirm for surfaces that cannot rule out a double submit;
    /// returns `None` when nothing is parked.
    pub fn confirm_if_pending(&self) -> Option<SwitchRequest> {
        let request = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        self.store.clear_all();
        info!(region = %request.region, "jurisdiction switch confirmed, order state cleared");
        Some(request)
    }

    /// Discard the parked target, leaving all candidate state untouched.
    ///
    /// Calling this with nothing parked is a programming error and panics.
    pub fn cancel(&self) {
        assert!(
            self.cancel_if_pending(),
            "TransitionGuard::cancel called with no switch awaiting confirmation"
        );
    }

    /// Atomic cancel; returns false when nothing is parked.
    pub fn cancel_if_pending(&self) -> bool {
        let request = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if request.is_some() {
            debug!("pending jurisdiction switch cancelled");
            true
        } else {
            false
        }
    }
}
