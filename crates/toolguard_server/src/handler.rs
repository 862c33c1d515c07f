//! Route handlers and error responses.

use crate::auth::Authenticator;
use crate::middleware::RateLimiter;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use toolguard_core::{RequestId, ValidationResult};
use toolguard_engine::{ConfigError, SharedEngine, ValidationRequest};
use toolguard_tool::ToolSchema;

/// Shared state behind every route
#[derive(Clone)]
pub struct AppState {
    /// Validation engine
    pub engine: Arc<SharedEngine>,
    /// API key check
    pub auth: Arc<Authenticator>,
    /// Per-client request limiter
    pub limiter: Arc<RateLimiter>,
    /// Largest accepted batch
    pub max_batch_size: usize,
}

/// Server error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Batch has no calls
    #[error("tool_calls must not be empty")]
    EmptyBatch,
    /// Batch exceeds the configured size
    #[error("batch of {size} calls exceeds the limit of {max}")]
    BatchTooLarge {
        /// Calls received
        size: usize,
        /// Configured maximum
        max: usize,
    },
    /// Body is not a valid request
    #[error("malformed request: {0}")]
    BadRequest(String),
    /// API key missing or wrong
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] crate::auth::AuthError),
    /// Client exceeded its request budget
    #[error("rate limit exceeded, retry later")]
    RateLimited,
    /// New configuration was rejected
    #[error("reload failed: {0}")]
    Reload(#[from] ConfigError),
    /// Listener or runtime failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status for this error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::EmptyBatch | Self::BatchTooLarge { .. } | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Reload(_) | Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyBatch => "empty_batch",
            Self::BatchTooLarge { .. } => "batch_too_large",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::Reload(_) => "reload_failed",
            Self::Io(_) | Self::Internal(_) => "internal_error",
        }
    }

    /// Attach the request id for the response body
    #[must_use]
    pub fn for_request(self, request_id: RequestId) -> ApiError {
        ApiError {
            error: self,
            request_id,
        }
    }
}

/// A server error bound to the request that caused it
#[derive(Debug)]
pub struct ApiError {
    /// The error
    pub error: ServerError,
    /// Request it belongs to
    pub request_id: RequestId,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        if status.is_server_error() {
            tracing::error!(request_id = %self.request_id, error = %self.error, "request failed");
        } else {
            tracing::debug!(request_id = %self.request_id, error = %self.error, "request refused");
        }
        let body = json!({
            "error": self.error.to_string(),
            "code": self.error.code(),
            "request_id": self.request_id.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Body of a successful validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    /// Always `success`
    pub status: String,
    /// One verdict per call, in request order
    pub results: ValidationResult,
    /// Wall-clock time spent validating
    pub processing_time_ms: u64,
    /// Request identifier
    pub request_id: String,
}

/// Body of the tools listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsResponse {
    /// Registered schemas in registration order
    pub tools: Vec<ToolSchema>,
}

/// `POST /api/v1/validate`
///
/// # Errors
///
/// Returns error for malformed, empty or oversized batches
pub async fn validate(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<ValidationRequest>, JsonRejection>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let started = Instant::now();
    let Json(mut request) =
        payload.map_err(|e| ServerError::BadRequest(e.body_text()).for_request(request_id))?;

    if request.tool_calls.is_empty() {
        return Err(ServerError::EmptyBatch.for_request(request_id));
    }
    if request.tool_calls.len() > state.max_batch_size {
        return Err(ServerError::BatchTooLarge {
            size: request.tool_calls.len(),
            max: state.max_batch_size,
        }
        .for_request(request_id));
    }

    if request.context.time_of_day.is_none() {
        request.context.time_of_day = u8::try_from(chrono::Local::now().hour()).ok();
    }

    let engine = state.engine.engine();
    let calls = request.tool_calls.len();
    let results = tokio::task::spawn_blocking(move || engine.validate(&request))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()).for_request(request_id))?;

    let processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    tracing::info!(
        %request_id,
        calls,
        approved = results.count(toolguard_core::VerdictStatus::Approved),
        processing_time_ms,
        "batch validated"
    );

    Ok(Json(ValidateResponse {
        status: "success".to_string(),
        results,
        processing_time_ms,
        request_id: request_id.to_string(),
    }))
}

/// `GET /api/v1/tools`
pub async fn tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    let snapshot = state.engine.snapshot();
    Json(ToolsResponse {
        tools: snapshot.registry().iter().cloned().collect(),
    })
}

/// `POST /api/v1/reload`
///
/// # Errors
///
/// Returns error if the new configuration is invalid; the running
/// configuration stays active
pub async fn reload(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let engine = Arc::clone(&state.engine);
    let snapshot = tokio::task::spawn_blocking(move || engine.reload())
        .await
        .map_err(|e| ServerError::Internal(e.to_string()).for_request(request_id))?
        .map_err(|e| ServerError::from(e).for_request(request_id))?;

    Ok(Json(json!({
        "status": "reloaded",
        "tools": snapshot.registry().len(),
        "policies": snapshot.policy().len(),
        "request_id": request_id.to_string(),
    })))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.engine.snapshot();
    Json(json!({
        "status": "ok",
        "tools": snapshot.registry().len(),
        "policies": snapshot.policy().len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ServerError::EmptyBatch.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServerError::BatchTooLarge { size: 5, max: 4 }.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServerError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ServerError::Unauthorized(crate::auth::AuthError::MissingToken).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServerError::Internal("boom".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let codes = [
            ServerError::EmptyBatch.code(),
            ServerError::BatchTooLarge { size: 1, max: 0 }.code(),
            ServerError::BadRequest(String::new()).code(),
            ServerError::RateLimited.code(),
        ];
        let mut unique = codes.to_vec();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
    }
}
