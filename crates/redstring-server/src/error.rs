//! HTTP error taxonomy. Kinds, not type names: every
//! variant maps to one of a small set of categories, and
//! `IntoResponse` never leaks prompt contents or internal identifiers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("missing or rejected API key")]
    Unauthorized,
    #[error("model provider failure: {0}")]
    ModelFailure(String),
    #[error("stale_base")]
    StaleBase,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::ModelFailure(_) => StatusCode::BAD_GATEWAY,
            ApiError::StaleBase => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message that actually reaches the client; internal errors are
    /// flattened to a generic string so a stray `anyhow` context chain
    /// never surfaces file paths or prompt fragments.
    fn public_message(&self) -> String {
        match self {
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                "system error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "success": false, "error": self.public_message() }));
        (status, body).into_response()
    }
}
