use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::Response;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::workflows::ordering::catalog::{Region, RegionCatalog, RenderRule, Service};
use crate::workflows::ordering::domain::{
    CandidateId, CandidateItem, FulfillmentKind, Price, ProductId, RegionCode, Verification,
};
use crate::workflows::ordering::session::OrderSession;
use crate::workflows::ordering::verification::{
    SearchTransport, TransportFailure, VerificationOutcome,
};

pub(super) const TITLE_SEARCH: &str = "title-search";
pub(super) const COMPANY_SEARCH: &str = "company-search";
pub(super) const LAND_TAX_CERTIFICATE: &str = "land-tax-certificate";

pub(super) fn catalog() -> RegionCatalog {
    let vic = Region {
        code: RegionCode("VIC".to_string()),
        display_name: "Victoria".to_string(),
        services: vec![
            Service {
                product_id: ProductId(TITLE_SEARCH.to_string()),
                identifier: "titleSearch".to_string(),
                fulfillment: FulfillmentKind::Automatic,
                price_incl_gst: "15.95".parse().expect("valid price"),
                disclaimer: Some("Register search statement only.".to_string()),
                render_map: vec![
                    RenderRule {
                        source: "volume".to_string(),
                        label: "Volume".to_string(),
                    },
                    RenderRule {
                        source: "folio".to_string(),
                        label: "Folio".to_string(),
                    },
                    RenderRule {
                        source: "cancelled".to_string(),
                        label: "Cancelled".to_string(),
                    },
                ],
            },
            Service {
                product_id: ProductId(COMPANY_SEARCH.to_string()),
                identifier: "companySearch".to_string(),
                fulfillment: FulfillmentKind::Automatic,
                price_incl_gst: "22.00".parse().expect("valid price"),
                disclaimer: None,
                render_map: vec![RenderRule {
                    source: "name".to_string(),
                    label: "Company Name".to_string(),
                }],
            },
            Service {
                product_id: ProductId(LAND_TAX_CERTIFICATE.to_string()),
                identifier: "landTaxCertificate".to_string(),
                fulfillment: FulfillmentKind::Manual,
                price_incl_gst: "9.50".parse().expect("valid price"),
                disclaimer: None,
                render_map: Vec::new(),
            },
        ],
        error_messages: BTreeSet::from([
            "Folio not found".to_string(),
            "Title reference invalid".to_string(),
        ]),
    };

    let nsw = Region {
        code: RegionCode("NSW".to_string()),
        display_name: "New South Wales".to_string(),
        services: vec![
            Service {
                product_id: ProductId(TITLE_SEARCH.to_string()),
                identifier: "titleSearch".to_string(),
                fulfillment: FulfillmentKind::Automatic,
                price_incl_gst: "14.20".parse().expect("valid price"),
                disclaimer: None,
                render_map: vec![RenderRule {
                    source: "folio".to_string(),
                    label: "Folio Identifier".to_string(),
                }],
            },
            Service {
                product_id: ProductId(LAND_TAX_CERTIFICATE.to_string()),
                identifier: "landTaxCertificate".to_string(),
                fulfillment: FulfillmentKind::Manual,
                price_incl_gst: "11.00".parse().expect("valid price"),
                disclaimer: None,
                render_map: Vec::new(),
            },
        ],
        error_messages: BTreeSet::from(["Record cancelled".to_string()]),
    };

    RegionCatalog::new(vec![vic, nsw]).expect("catalog is well formed")
}

pub(super) fn vic() -> RegionCode {
    RegionCode("VIC".to_string())
}

pub(super) fn title_search() -> ProductId {
    ProductId(TITLE_SEARCH.to_string())
}

pub(super) fn company_search() -> ProductId {
    ProductId(COMPANY_SEARCH.to_string())
}

pub(super) fn candidate(product: &str, id: &str, price_minor: i64) -> CandidateItem {
    CandidateItem {
        id: CandidateId(id.to_string()),
        product_id: ProductId(product.to_string()),
        identifier: "titleSearch".to_string(),
        description: format!("Title reference {id}"),
        chosen: false,
        fulfillment: FulfillmentKind::Automatic,
        price: Price::from_minor_units(price_minor),
        render_fields: BTreeMap::new(),
        verification: Verification::unverified(),
        raw_inputs: BTreeMap::from([("reference".to_string(), json!(id))]),
        added_at: Utc::now(),
    }
}

pub(super) fn chosen_candidate(product: &str, id: &str, price_minor: i64) -> CandidateItem {
    let mut item = candidate(product, id, price_minor);
    item.verification = Verification::verified();
    item.chosen = true;
    item
}

pub(super) fn payload(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

pub(super) fn payload_outcome(entries: &[(&str, Value)]) -> VerificationOutcome {
    VerificationOutcome::Payload(payload(entries))
}

pub(super) fn notification(message: &str) -> VerificationOutcome {
    VerificationOutcome::Notification {
        message: message.to_string(),
    }
}

#[derive(Debug, Clone)]
pub(super) struct RecordedCall {
    pub region: RegionCode,
    pub identifier: String,
    pub payloads: Vec<BTreeMap<String, Value>>,
}

/// Transport answering from a scripted queue, recording every call.
#[derive(Default)]
pub(super) struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<Vec<VerificationOutcome>, TransportFailure>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn push_ok(&self, outcomes: Vec<VerificationOutcome>) {
        self.responses
            .lock()
            .expect("script mutex")
            .push_back(Ok(outcomes));
    }

    pub fn push_err(&self, message: &str) {
        self.responses
            .lock()
            .expect("script mutex")
            .push_back(Err(TransportFailure(message.to_string())));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls mutex").clone()
    }
}

#[async_trait]
impl SearchTransport for ScriptedTransport {
    async fn call(
        &self,
        region: &RegionCode,
        identifier: &str,
        payloads: Vec<BTreeMap<String, Value>>,
    ) -> Result<Vec<VerificationOutcome>, TransportFailure> {
        self.calls.lock().expect("calls mutex").push(RecordedCall {
            region: region.clone(),
            identifier: identifier.to_string(),
            payloads,
        });
        self.responses
            .lock()
            .expect("script mutex")
            .pop_front()
            .unwrap_or_else(|| Err(TransportFailure("no scripted response".to_string())))
    }
}

/// Transport that parks every call until the test releases it, so suspension
/// at the batch await point can be observed deterministically.
pub(super) struct GatedTransport {
    gate: Semaphore,
    response: Mutex<Option<Result<Vec<VerificationOutcome>, TransportFailure>>>,
}

impl GatedTransport {
    pub fn new(response: Result<Vec<VerificationOutcome>, TransportFailure>) -> Self {
        Self {
            gate: Semaphore::new(0),
            response: Mutex::new(Some(response)),
        }
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl SearchTransport for GatedTransport {
    async fn call(
        &self,
        _region: &RegionCode,
        _identifier: &str,
        _payloads: Vec<BTreeMap<String, Value>>,
    ) -> Result<Vec<VerificationOutcome>, TransportFailure> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| TransportFailure("gate closed".to_string()))?;
        permit.forget();
        self.response
            .lock()
            .expect("response mutex")
            .take()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub(super) fn session_with_script() -> (Arc<OrderSession<ScriptedTransport>>, Arc<ScriptedTransport>)
{
    let transport = Arc::new(ScriptedTransport::default());
    let session = Arc::new(
        OrderSession::new(Arc::new(catalog()), transport.clone(), vic())
            .expect("VIC exists in the catalog"),
    );
    (session, transport)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_conflict_response(response: Response) {
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
