use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stable key bucketing candidate items by the product they would order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-assigned identifier, unique within one product bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub String);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Jurisdiction code, e.g. `VIC` or `NSW`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionCode(pub String);

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a service resolves through a remote lookup or user-supplied data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentKind {
    Automatic,
    Manual,
}

impl FulfillmentKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Automatic => "Automatic",
            Self::Manual => "Manual",
        }
    }
}

/// GST-inclusive money held as integer minor units; never accumulated as floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Price(i64);

impl Price {
    pub const ZERO: Price = Price(0);

    pub const fn from_minor_units(units: i64) -> Self {
        Self(units)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub fn saturating_add(self, other: Price) -> Price {
        Price(self.0.saturating_add(other.0))
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str_exact(text.trim())
            .map_err(|_| PriceError::Invalid(text.to_owned()))?
            .normalize();

        if decimal.scale() > 2 {
            return Err(PriceError::Precision(text.to_owned()));
        }

        let minor = (decimal * Decimal::ONE_HUNDRED)
            .to_i64()
            .ok_or_else(|| PriceError::Invalid(text.to_owned()))?;

        Ok(Self(minor))
    }
}

impl TryFrom<String> for Price {
    type Error = PriceError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<Price> for String {
    fn from(price: Price) -> Self {
        price.to_string()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", magnitude / 100, magnitude % 100)
    }
}

/// Error raised when a decimal-as-string price cannot be represented exactly.
#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("price '{0}' is not a valid decimal amount")]
    Invalid(String),
    #[error("price '{0}' carries more than two decimal places")]
    Precision(String),
}

/// Display-only projection value produced from a verified payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RenderValue {
    Flag(bool),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    Unverified,
    Pending,
    Verified,
    Failed,
}

impl VerificationState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unverified => "Unverified",
            Self::Pending => "Pending",
            Self::Verified => "Verified",
            Self::Failed => "Failed",
        }
    }
}

/// Outcome class for a failed verification, per the region's message catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warning => "Warning",
        }
    }
}

/// Verification progress attached to a candidate item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub state: VerificationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Verification {
    pub fn unverified() -> Self {
        Self {
            state: VerificationState::Unverified,
            severity: None,
            message: None,
        }
    }

    pub fn pending() -> Self {
        Self {
            state: VerificationState::Pending,
            severity: None,
            message: None,
        }
    }

    pub fn verified() -> Self {
        Self {
            state: VerificationState::Verified,
            severity: None,
            message: None,
        }
    }

    pub fn failed(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            state: VerificationState::Failed,
            severity: Some(severity),
            message: Some(message.into()),
        }
    }
}

impl Default for Verification {
    fn default() -> Self {
        Self::unverified()
    }
}

/// A potential order line item: manually entered or returned by search,
/// not yet or possibly committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub id: CandidateId,
    pub product_id: ProductId,
    pub identifier: String,
    pub description: String,
    pub chosen: bool,
    pub fulfillment: FulfillmentKind,
    pub price: Price,
    #[serde(default)]
    pub render_fields: BTreeMap<String, RenderValue>,
    #[serde(default)]
    pub verification: Verification,
    #[serde(default)]
    pub raw_inputs: BTreeMap<String, serde_json::Value>,
    pub added_at: DateTime<Utc>,
}

impl CandidateItem {
    /// An item is selectable unless verification is pending or failed hard.
    pub fn is_selectable(&self) -> bool {
        match self.verification.state {
            VerificationState::Pending => false,
            VerificationState::Failed => self.verification.severity != Some(Severity::Error),
            VerificationState::Unverified | VerificationState::Verified => true,
        }
    }
}

/// Field-wise patch applied by `CandidateItemStore::update`.
#[derive(Debug, Clone, Default)]
pub struct CandidateItemPatch {
    pub description: Option<String>,
    pub chosen: Option<bool>,
    pub price: Option<Price>,
    pub verification: Option<Verification>,
    pub render_fields: Option<BTreeMap<String, RenderValue>>,
}

impl CandidateItemPatch {
    pub fn chosen(value: bool) -> Self {
        Self {
            chosen: Some(value),
            ..Self::default()
        }
    }

    pub fn verification(value: Verification) -> Self {
        Self {
            verification: Some(value),
            ..Self::default()
        }
    }
}
