use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::domain::{FulfillmentKind, Price, ProductId, RegionCode, RenderValue, Severity};

/// Rule projecting one payload field into the display-only render map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRule {
    /// Key looked up in the verified payload.
    pub source: String,
    /// Key the value is published under in `render_fields`.
    pub label: String,
}

/// One orderable search service within a jurisdiction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub product_id: ProductId,
    /// Names the specific remote verification/search operation.
    pub identifier: String,
    pub fulfillment: FulfillmentKind,
    pub price_incl_gst: Price,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
    #[serde(default)]
    pub render_map: Vec<RenderRule>,
}

impl Service {
    /// Project a verified payload into render fields using this service's
    /// mapping rules. Unmapped payload keys are dropped; mapped keys absent
    /// from the payload are skipped.
    pub fn project_payload(
        &self,
        payload: &BTreeMap<String, serde_json::Value>,
    ) -> BTreeMap<String, RenderValue> {
        let mut fields = BTreeMap::new();
        for rule in &self.render_map {
            let Some(value) = payload.get(&rule.source) else {
                continue;
            };
            let rendered = match value {
                serde_json::Value::Bool(flag) => RenderValue::Flag(*flag),
                serde_json::Value::String(text) => RenderValue::Text(text.clone()),
                serde_json::Value::Number(number) => RenderValue::Text(number.to_string()),
                _ => continue,
            };
            fields.insert(rule.label.clone(), rendered);
        }
        fields
    }
}

/// Immutable description of one jurisdiction: its ordered services plus the
/// message catalog that classifies verification notifications as hard errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub code: RegionCode,
    pub display_name: String,
    pub services: Vec<Service>,
    /// Notification messages classified as `Severity::Error` for this region;
    /// everything else downgrades to a warning.
    #[serde(default)]
    pub error_messages: BTreeSet<String>,
}

impl Region {
    pub fn service(&self, product_id: &ProductId) -> Option<&Service> {
        self.services
            .iter()
            .find(|service| &service.product_id == product_id)
    }

    /// Classify a verification notification message for this jurisdiction.
    pub fn classify(&self, message: &str) -> Severity {
        if self.error_messages.contains(message) {
            Severity::Error
        } else {
            Severity::Warning
        }
    }
}

/// Read-once lookup table over every jurisdiction; loaded at process start
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionCatalog {
    regions: Vec<Region>,
}

impl RegionCatalog {
    pub fn new(regions: Vec<Region>) -> Result<Self, CatalogError> {
        let mut seen = BTreeSet::new();
        for region in &regions {
            if !seen.insert(region.code.clone()) {
                return Err(CatalogError::DuplicateRegion(region.code.clone()));
            }
            let mut products = BTreeSet::new();
            for service in &region.services {
                if !products.insert(service.product_id.clone()) {
                    return Err(CatalogError::DuplicateService {
                        region: region.code.clone(),
                        product: service.product_id.clone(),
                    });
                }
            }
        }
        Ok(Self { regions })
    }

    pub fn from_json(document: &str) -> Result<Self, CatalogError> {
        let regions: Vec<Region> = serde_json::from_str(document)?;
        Self::new(regions)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let document = std::fs::read_to_string(path)?;
        Self::from_json(&document)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, code: &RegionCode) -> Option<&Region> {
        self.regions.iter().find(|region| &region.code == code)
    }

    pub fn service(&self, code: &RegionCode, product_id: &ProductId) -> Option<&Service> {
        self.region(code)?.service(product_id)
    }
}

/// Errors raised while loading or validating the region catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unable to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("region {0} is listed more than once")]
    DuplicateRegion(RegionCode),
    #[error("region {region} lists product {product} more than once")]
    DuplicateService {
        region: RegionCode,
        product: ProductId,
    },
}
