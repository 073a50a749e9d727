use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::ordering::catalog::CatalogError;
use crate::workflows::ordering::session::OrderError;
use crate::workflows::ordering::verification::VerificationError;

/// Top-level error for embedding services and the HTTP facade.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Order(#[from] OrderError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Order(OrderError::Duplicate(_)) => StatusCode::CONFLICT,
            AppError::Order(OrderError::Verification(VerificationError::BatchInFlight(_))) => {
                StatusCode::CONFLICT
            }
            AppError::Order(OrderError::Verification(VerificationError::Transport(_))) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Order(OrderError::UnknownRegion(_) | OrderError::UnknownService { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Config(_) | AppError::Telemetry(_) | AppError::Catalog(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn user_message(&self) -> String {
        match self {
            // A whole-batch transport failure surfaces as one generic
            // message; per-item outcomes never reach this path.
            AppError::Order(OrderError::Verification(VerificationError::Transport(_))) => {
                "the search service is temporarily unavailable; no items were verified".to_string()
            }
            AppError::Order(OrderError::Duplicate(_)) => "already added".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.user_message() }));
        (self.status(), body).into_response()
    }
}
