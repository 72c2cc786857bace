//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::processor::PipelineError;

/// Failure payload: `{ message, error, stack? }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Upload rejected: {0}")]
    Validation(String),
    #[error("No text could be extracted from the uploaded files")]
    NoTextExtracted,
    /// `stack` is only populated when diagnostics may be exposed.
    #[error("Internal error: {detail}")]
    Internal { detail: String, stack: Option<String> },
}

impl ApiError {
    /// Internal error from any source; `expose_stack` controls whether the
    /// source chain reaches the client.
    pub fn internal(err: &(dyn std::error::Error + 'static), expose_stack: bool) -> Self {
        ApiError::Internal {
            detail: err.to_string(),
            stack: expose_stack.then(|| error_chain(err)),
        }
    }

    pub fn from_pipeline(err: PipelineError, expose_stack: bool) -> Self {
        match err {
            PipelineError::Validation(e) => ApiError::Validation(e.to_string()),
            PipelineError::NoTextExtracted => ApiError::NoTextExtracted,
            other => ApiError::internal(&other, expose_stack),
        }
    }
}

/// `err` followed by each `source()`, one per line.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut lines = vec![err.to_string()];
    let mut current = err.source();
    while let Some(source) = current {
        lines.push(format!("caused by: {source}"));
        current = source.source();
    }
    lines.join("\n")
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, stack) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail, None),
            ApiError::Validation(detail) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_FAILED", detail, None)
            }
            ApiError::NoTextExtracted => (
                StatusCode::BAD_REQUEST,
                "NO_TEXT_EXTRACTED",
                "No text could be extracted from the uploaded files".to_string(),
                None,
            ),
            ApiError::Internal { detail, stack } => {
                tracing::error!(detail = %detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred while processing the files".to_string(),
                    stack,
                )
            }
        };

        let body = ErrorBody {
            message,
            error: code,
            stack,
        };
        (status, Json(body)).into_response()
    }
}
