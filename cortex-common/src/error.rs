//! Error taxonomy shared by the gateway and admin surfaces.
//!
//! Transport framing (`IntoResponse`, status codes) lives in `cortex-gateway`
//! so that this crate stays free of an `axum` dependency; every non-HTTP
//! crate only needs to produce one of these kinds.

use thiserror::Error;

/// One of the error kinds enumerated in the specification's error-handling
/// design. The transport-code mapping lives alongside each variant as a
/// doc comment rather than duplicated logic; `cortex-gateway` owns the
/// actual HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 401
    AuthMissing,
    /// 401
    AuthInvalid,
    /// 401
    AuthExpired,
    /// 403
    AuthScope,
    /// 429
    RateLimited,
    /// 429
    ConcurrencyExceeded,
    /// 404
    ModelNotFound,
    /// 409
    ModelNotReady,
    /// 404
    ModelArchived,
    /// 400
    ValidationError,
    /// 409
    StateConflict,
    /// 503
    UpstreamUnavailable,
    /// 502
    UpstreamError,
    /// 504
    UpstreamTimeout,
    /// 499
    RequestCancelled,
    /// 500
    InternalError,
}

impl ErrorKind {
    /// The transport-ish code documented in spec.md §7 (note: 499 is not a
    /// registered HTTP status but is what the spec calls for).
    pub fn code(self) -> u16 {
        match self {
            ErrorKind::AuthMissing | ErrorKind::AuthInvalid | ErrorKind::AuthExpired => 401,
            ErrorKind::AuthScope => 403,
            ErrorKind::RateLimited | ErrorKind::ConcurrencyExceeded => 429,
            ErrorKind::ModelNotFound | ErrorKind::ModelArchived => 404,
            ErrorKind::ModelNotReady | ErrorKind::StateConflict => 409,
            ErrorKind::ValidationError => 400,
            ErrorKind::UpstreamUnavailable => 503,
            ErrorKind::UpstreamError => 502,
            ErrorKind::UpstreamTimeout => 504,
            ErrorKind::RequestCancelled => 499,
            ErrorKind::InternalError => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::AuthMissing => "auth_missing",
            ErrorKind::AuthInvalid => "auth_invalid",
            ErrorKind::AuthExpired => "auth_expired",
            ErrorKind::AuthScope => "auth_scope",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ConcurrencyExceeded => "concurrency_exceeded",
            ErrorKind::ModelNotFound => "model_not_found",
            ErrorKind::ModelNotReady => "model_not_ready",
            ErrorKind::ModelArchived => "model_archived",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::UpstreamError => "upstream_error",
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::RequestCancelled => "request_cancelled",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

/// The error type every CORTEX crate returns at its public boundary.
#[derive(Debug, Error)]
#[error("{kind_str}: {message}")]
pub struct CortexError {
    kind: ErrorKind,
    kind_str: &'static str,
    message: String,
    /// Field-level detail for `validation_error`, e.g. `served_name`.
    field: Option<String>,
}

impl CortexError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            kind_str: kind.as_str(),
            message: message.into(),
            field: None,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ValidationError,
            kind_str: ErrorKind::ValidationError.as_str(),
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }
}

/// Internal bugs are wrapped from `anyhow::Error` at crate boundaries;
/// the original error is logged (see `cortex-gateway`'s error handler) but
/// never exposed to the client.
impl From<anyhow::Error> for CortexError {
    fn from(err: anyhow::Error) -> Self {
        CortexError::new(ErrorKind::InternalError, err.to_string())
    }
}
