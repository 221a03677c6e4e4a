//! Error kinds surfaced to status pollers and run starters.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::models::matrix::MatrixState;

#[derive(Debug, thiserror::Error)]
pub enum TestlabError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// A remote call failed on both attempts. Pollers may retry later.
    #[error("{operation} failed after retry: {detail}")]
    UpstreamUnavailable {
        operation: &'static str,
        detail: String,
    },

    /// The remote job reached an error state. Not recoverable.
    #[error("test matrix failed: {state}({detail})")]
    RemoteJobFailed { state: MatrixState, detail: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("build store unavailable: {0}")]
    Storage(String),
}

impl TestlabError {
    pub fn kind(&self) -> &'static str {
        match self {
            TestlabError::NotFound(_) => "not_found",
            TestlabError::Conflict(_) => "conflict",
            TestlabError::UpstreamUnavailable { .. } => "upstream_unavailable",
            TestlabError::RemoteJobFailed { .. } => "remote_job_failed",
            TestlabError::InvalidRequest(_) => "invalid_request",
            TestlabError::Storage(_) => "storage",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            TestlabError::NotFound(_) => StatusCode::NOT_FOUND,
            TestlabError::Conflict(_) => StatusCode::CONFLICT,
            TestlabError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            TestlabError::RemoteJobFailed { .. } => StatusCode::BAD_GATEWAY,
            TestlabError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            TestlabError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether repeating the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TestlabError::UpstreamUnavailable { .. } | TestlabError::Storage(_)
        )
    }
}

impl From<crate::store::StoreError> for TestlabError {
    fn from(err: crate::store::StoreError) -> Self {
        TestlabError::Storage(err.to_string())
    }
}

impl From<JsonRejection> for TestlabError {
    fn from(rejection: JsonRejection) -> Self {
        TestlabError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for TestlabError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "retryable": self.is_retryable(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}
