use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;

use super::domain::{CandidateId, ProductId};
use super::pager::DEFAULT_PAGE_SIZE;
use super::session::{NewCandidate, OrderSession};
use super::transition::{SwitchOutcome, SwitchRequest};
use super::verification::SearchTransport;

/// Router builder exposing the order session over HTTP. Thin facade only:
/// all behavior lives in the session and its collaborators.
pub fn ordering_router<T>(session: Arc<OrderSession<T>>) -> Router
where
    T: SearchTransport + 'static,
{
    Router::new()
        .route("/api/v1/order", get(order_handler::<T>))
        .route("/api/v1/order/items", post(add_item_handler::<T>))
        .route(
            "/api/v1/order/items/:product_id",
            get(bucket_handler::<T>),
        )
        .route(
            "/api/v1/order/items/:product_id/search",
            post(search_handler::<T>),
        )
        .route(
            "/api/v1/order/items/:product_id/verify",
            post(verify_handler::<T>),
        )
        .route(
            "/api/v1/order/items/:product_id/chosen",
            post(choose_all_handler::<T>),
        )
        .route(
            "/api/v1/order/items/:product_id/:id/chosen",
            post(choose_one_handler::<T>),
        )
        .route(
            "/api/v1/order/items/:product_id/:id",
            delete(remove_handler::<T>),
        )
        .route("/api/v1/order/switch", post(switch_handler::<T>))
        .route(
            "/api/v1/order/switch/confirm",
            post(confirm_switch_handler::<T>),
        )
        .route(
            "/api/v1/order/switch/cancel",
            post(cancel_switch_handler::<T>),
        )
        .with_state(session)
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageQuery {
    #[serde(default)]
    page: usize,
    page_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChosenBody {
    chosen: bool,
}

pub(crate) async fn order_handler<T: SearchTransport>(
    State(session): State<Arc<OrderSession<T>>>,
) -> Response {
    let snapshot = session.order();
    let body = json!({
        "location": session.location(),
        "guard_state": session.guard_state(),
        "order": snapshot,
    });
    (StatusCode::OK, Json(body)).into_response()
}

pub(crate) async fn add_item_handler<T: SearchTransport>(
    State(session): State<Arc<OrderSession<T>>>,
    Json(new): Json<NewCandidate>,
) -> Result<Response, AppError> {
    let item = session.add_manual_item(new)?;
    Ok((StatusCode::CREATED, Json(item)).into_response())
}

pub(crate) async fn bucket_handler<T: SearchTransport>(
    State(session): State<Arc<OrderSession<T>>>,
    Path(product_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let product_id = ProductId(product_id);
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    let items = session.bucket_page(&product_id, query.page, page_size);
    let total = session.bucket(&product_id).len();
    let body = json!({
        "items": items,
        "total": total,
        "page": query.page,
        "page_size": page_size,
    });
    (StatusCode::OK, Json(body)).into_response()
}

pub(crate) async fn search_handler<T: SearchTransport>(
    State(session): State<Arc<OrderSession<T>>>,
    Path(product_id): Path<String>,
    Json(criteria): Json<BTreeMap<String, serde_json::Value>>,
) -> Result<Response, AppError> {
    let inserted = session.search(&ProductId(product_id), criteria).await?;
    Ok((StatusCode::OK, Json(json!({ "inserted": inserted }))).into_response())
}

pub(crate) async fn verify_handler<T: SearchTransport>(
    State(session): State<Arc<OrderSession<T>>>,
    Path(product_id): Path<String>,
) -> Result<Response, AppError> {
    let report = session.verify_bucket(&ProductId(product_id)).await?;
    Ok((StatusCode::OK, Json(report)).into_response())
}

pub(crate) async fn choose_all_handler<T: SearchTransport>(
    State(session): State<Arc<OrderSession<T>>>,
    Path(product_id): Path<String>,
    Json(body): Json<ChosenBody>,
) -> Response {
    session.set_all_chosen(&ProductId(product_id), body.chosen);
    StatusCode::NO_CONTENT.into_response()
}

pub(crate) async fn choose_one_handler<T: SearchTransport>(
    State(session): State<Arc<OrderSession<T>>>,
    Path((product_id, id)): Path<(String, String)>,
    Json(body): Json<ChosenBody>,
) -> Response {
    let found = session.set_chosen(&ProductId(product_id), &CandidateId(id), body.chosen);
    if found {
        StatusCode::NO_CONTENT.into_response()
    } else {
        let payload = json!({ "error": "item not found" });
        (StatusCode::NOT_FOUND, Json(payload)).into_response()
    }
}

pub(crate) async fn remove_handler<T: SearchTransport>(
    State(session): State<Arc<OrderSession<T>>>,
    Path((product_id, id)): Path<(String, String)>,
) -> Response {
    let removed = session.remove_item(&ProductId(product_id), &CandidateId(id));
    if removed {
        StatusCode::NO_CONTENT.into_response()
    } else {
        let payload = json!({ "error": "item not found" });
        (StatusCode::NOT_FOUND, Json(payload)).into_response()
    }
}

pub(crate) async fn switch_handler<T: SearchTransport>(
    State(session): State<Arc<OrderSession<T>>>,
    Json(request): Json<SwitchRequest>,
) -> Result<Response, AppError> {
    match session.request_switch(request)? {
        SwitchOutcome::Applied(applied) => {
            Ok((StatusCode::OK, Json(json!({ "applied": applied }))).into_response())
        }
        SwitchOutcome::AwaitingConfirmation => {
            let payload = json!({ "awaiting_confirmation": true });
            Ok((StatusCode::ACCEPTED, Json(payload)).into_response())
        }
    }
}

pub(crate) async fn confirm_switch_handler<T: SearchTransport>(
    State(session): State<Arc<OrderSession<T>>>,
) -> Response {
    // Guard transitions from idle are programming errors inside the engine;
    // the HTTP surface screens out double submits instead of panicking.
    match session.try_confirm_switch() {
        Some(applied) => (StatusCode::OK, Json(json!({ "applied": applied }))).into_response(),
        None => {
            let payload = json!({ "error": "no switch awaiting confirmation" });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn cancel_switch_handler<T: SearchTransport>(
    State(session): State<Arc<OrderSession<T>>>,
) -> Response {
    if session.try_cancel_switch() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        let payload = json!({ "error": "no switch awaiting confirmation" });
        (StatusCode::CONFLICT, Json(payload)).into_response()
    }
}
