use std::collections::BTreeMap;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::response::IntoResponse;
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::workflows::ordering::router::{self, ordering_router};
use crate::workflows::ordering::session::NewCandidate;
use crate::workflows::ordering::domain::{CandidateId, ProductId};

fn certificate_request() -> NewCandidate {
    NewCandidate {
        product_id: ProductId(LAND_TAX_CERTIFICATE.to_string()),
        id: CandidateId("cert-2026-001".to_string()),
        description: "Land tax certificate, 12 Example St".to_string(),
        raw_inputs: BTreeMap::new(),
        price: None,
        chosen: true,
    }
}

fn json_post(uri: &str, body: &impl serde::Serialize) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("serializable")))
        .expect("request builds")
}

#[tokio::test]
async fn add_route_creates_then_conflicts_on_duplicate() {
    let (session, _transport) = session_with_script();
    let router = ordering_router(session);

    let created = router
        .clone()
        .oneshot(json_post("/api/v1/order/items", &certificate_request()))
        .await
        .expect("router responds");
    assert_eq!(created.status(), StatusCode::CREATED);

    let duplicate = router
        .oneshot(json_post("/api/v1/order/items", &certificate_request()))
        .await
        .expect("router responds");
    assert_conflict_response(duplicate);
}

#[tokio::test]
async fn duplicate_add_reports_already_added() {
    let (session, _transport) = session_with_script();
    session
        .add_manual_item(certificate_request())
        .expect("first add succeeds");

    let result = router::add_item_handler(State(session), axum::Json(certificate_request())).await;
    let error = match result {
        Ok(_) => panic!("expected a duplicate error"),
        Err(error) => error,
    };

    let body = read_json_body(error.into_response()).await;
    assert_eq!(body["error"], json!("already added"));
}

#[tokio::test]
async fn verify_route_maps_transport_failure_to_bad_gateway() {
    let (session, transport) = session_with_script();
    session
        .add_manual_item(NewCandidate {
            product_id: title_search(),
            id: CandidateId("vol-8021-fol-431".to_string()),
            description: "Vol 8021 Fol 431".to_string(),
            raw_inputs: BTreeMap::from([("reference".to_string(), json!("8021/431"))]),
            price: None,
            chosen: false,
        })
        .expect("add succeeds");
    transport.push_err("gateway timeout");

    let response = ordering_router(session)
        .oneshot(json_post(
            &format!("/api/v1/order/items/{TITLE_SEARCH}/verify"),
            &json!({}),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = read_json_body(response).await;
    assert_eq!(
        body["error"],
        json!("the search service is temporarily unavailable; no items were verified")
    );
}

#[tokio::test]
async fn order_route_reports_the_committed_snapshot() {
    let (session, _transport) = session_with_script();
    session
        .add_manual_item(certificate_request())
        .expect("add succeeds");

    let response = ordering_router(session)
        .oneshot(
            Request::get("/api/v1/order")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["order"]["item_count"], json!(1));
    assert_eq!(body["order"]["total_price"], json!("9.50"));
    assert_eq!(body["location"]["region"], json!("VIC"));
    assert_eq!(body["guard_state"], json!("idle"));
}

#[tokio::test]
async fn bucket_route_pages_with_clamping() {
    let (session, _transport) = session_with_script();
    for index in 0..3 {
        session
            .add_manual_item(NewCandidate {
                product_id: ProductId(LAND_TAX_CERTIFICATE.to_string()),
                id: CandidateId(format!("cert-{index}")),
                description: format!("Certificate {index}"),
                raw_inputs: BTreeMap::new(),
                price: None,
                chosen: false,
            })
            .expect("add succeeds");
    }

    let response = ordering_router(session)
        .oneshot(
            Request::get(format!(
                "/api/v1/order/items/{LAND_TAX_CERTIFICATE}?page=9&page_size=2"
            ))
            .body(Body::empty())
            .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["total"], json!(3));
    // Out-of-range page index falls back to the first page.
    assert_eq!(body["items"][0]["id"], json!("cert-0"));
}

#[tokio::test]
async fn switch_route_holds_for_confirmation_then_clears_on_confirm() {
    let (session, _transport) = session_with_script();
    session
        .add_manual_item(certificate_request())
        .expect("add succeeds");

    let router = ordering_router(session.clone());
    let body = json!({ "region": "NSW" });

    let parked = router
        .clone()
        .oneshot(json_post("/api/v1/order/switch", &body))
        .await
        .expect("router responds");
    assert_eq!(parked.status(), StatusCode::ACCEPTED);

    let confirmed = router
        .oneshot(json_post("/api/v1/order/switch/confirm", &json!({})))
        .await
        .expect("router responds");
    assert_eq!(confirmed.status(), StatusCode::OK);

    assert_eq!(session.order().item_count, 0);
    assert_eq!(session.location().region.0, "NSW");
}

#[tokio::test]
async fn confirm_route_without_pending_switch_is_conflict() {
    let (session, _transport) = session_with_script();
    let response = router::confirm_switch_handler(State(session)).await;
    assert_conflict_response(response);
}

#[tokio::test]
async fn cancel_route_without_pending_switch_is_conflict() {
    let (session, _transport) = session_with_script();
    let response = router::cancel_switch_handler(State(session)).await;
    assert_conflict_response(response);
}

#[tokio::test]
async fn remove_route_reports_missing_items() {
    let (session, _transport) = session_with_script();
    let response = ordering_router(session)
        .oneshot(
            Request::delete(format!("/api/v1/order/items/{TITLE_SEARCH}/ghost"))
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
