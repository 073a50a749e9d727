//! The order-construction and verification workflow engine.
//!
//! `CandidateItemStore` owns the working set of candidate items and is the
//! single mutable resource; `VerificationCoordinator` issues positional
//! verification batches against it; `OrderAssembler` derives the committed
//! order on every change; `TransitionGuard` gates jurisdiction switches; and
//! `OrderSession` composes one of each per active order.

pub mod assembler;
pub mod catalog;
pub mod domain;
pub mod pager;
pub mod router;
pub mod session;
pub mod store;
pub mod transition;
pub mod verification;

#[cfg(test)]
mod tests;

pub use assembler::{OrderAssembler, OrderSnapshot};
pub use catalog::{CatalogError, Region, RegionCatalog, RenderRule, Service};
pub use domain::{
    CandidateId, CandidateItem, CandidateItemPatch, FulfillmentKind, Price, PriceError, ProductId,
    RegionCode, RenderValue, Severity, Verification, VerificationState,
};
pub use router::ordering_router;
pub use session::{NewCandidate, OrderError, OrderSession, SessionLocation};
pub use store::{CandidateItemStore, DuplicateIdError, StoreObserver};
pub use transition::{CarriedContext, GuardState, SwitchOutcome, SwitchRequest, TransitionGuard};
pub use verification::{
    BatchReport, SearchTransport, TransportFailure, VerificationCoordinator, VerificationError,
    VerificationOutcome,
};
