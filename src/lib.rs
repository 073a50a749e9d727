//! Order-construction and verification workflow engine for a
//! multi-jurisdiction property-search ordering portal.
//!
//! The engine turns jurisdiction-specific search criteria into a committed,
//! priced set of order line items: a candidate store fed by manual entry and
//! remote search, a batch verification coordinator correlating responses by
//! position, a derived order snapshot, and a confirmation gate guarding
//! jurisdiction switches. Presentation, billing, and persistence of the
//! final order live outside this crate.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
