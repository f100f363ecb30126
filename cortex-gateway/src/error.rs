//! Single `IntoResponse` mapping shared by the public and admin surfaces
//! (spec.md §4.6, §7), mirroring the teacher's one-`ApiError`-to-
//! `ProblemDetails` shape in `api/src/error.rs` with CORTEX's flatter
//! envelope instead of RFC 7807.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cortex_common::error::CortexError;
use cortex_values::error_envelope::ErrorEnvelope;

use crate::request_id::RequestIdExt;

/// Wraps a [`CortexError`] with the request id it should be reported
/// under; the only type gateway handlers return as their `Err` variant.
pub struct GatewayError {
    pub inner: CortexError,
    pub request_id: String,
}

impl GatewayError {
    pub fn new(inner: CortexError, request_id: impl Into<String>) -> Self {
        Self { inner, request_id: request_id.into() }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let code = self.inner.kind().code();
        // 499 is not a registered `StatusCode` constant; build it directly.
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let envelope = ErrorEnvelope::new(code, self.inner.message(), self.request_id.clone());

        if !matches!(self.inner.kind(), cortex_common::error::ErrorKind::InternalError) {
            tracing::warn!(kind = self.inner.kind().as_str(), request_id = %self.request_id, "request failed");
        } else {
            tracing::error!(request_id = %self.request_id, message = self.inner.message(), "internal error");
        }

        let mut response = (status, Json(envelope)).into_response();
        if let Ok(value) = HeaderValue::from_str(&self.request_id) {
            response.set_request_id_header(value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_common::error::ErrorKind;

    #[tokio::test]
    async fn request_cancelled_maps_to_the_non_standard_499() {
        let err = GatewayError::new(CortexError::new(ErrorKind::RequestCancelled, "client disconnected"), "req-1");
        let response = err.into_response();
        assert_eq!(response.status().as_u16(), 499);
        assert_eq!(response.headers().get("x-request-id").unwrap(), "req-1");
    }

    #[tokio::test]
    async fn model_not_found_maps_to_404_with_the_error_envelope() {
        let err = GatewayError::new(CortexError::new(ErrorKind::ModelNotFound, "model 7 not found"), "req-2");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], 404);
        assert_eq!(json["request_id"], "req-2");
    }

    #[tokio::test]
    async fn concurrency_exceeded_maps_to_429() {
        let err = GatewayError::new(CortexError::new(ErrorKind::ConcurrencyExceeded, "too many concurrent streams"), "req-3");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
