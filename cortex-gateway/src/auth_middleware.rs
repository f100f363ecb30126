//! Request-scoped auth extractors (spec.md §4.5): `/v1/*` authenticates a
//! bearer API key only, `/admin/*` accepts either a session cookie or an
//! admin-scoped API key. Both extractors also run the request through the
//! rate limiter before handing control to the handler.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::header::AUTHORIZATION;
use cortex_auth::{admit_request, authenticate_api_key, require_admin, require_scope, ConcurrencyGuard, Principal};
use cortex_common::error::{CortexError, ErrorKind};
use cortex_common::request_id::RequestId;
use cortex_values::model::ApiKeyScope;

use crate::error::GatewayError;
use crate::state::SharedState;

const SESSION_COOKIE_NAME: &str = "cortex_session";

fn request_id_of(parts: &Parts) -> String {
    parts
        .extensions
        .get::<RequestId>()
        .map(|id| id.as_str().to_string())
        .unwrap_or_else(|| RequestId::new().as_str().to_string())
}

fn cookie_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    let header = parts.headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then(|| v.trim())
    })
}

/// A caller authenticated against a bearer API key — the only credential
/// `/v1/*` accepts.
pub struct ApiKeyPrincipal(pub Principal);

impl FromRequestParts<SharedState> for ApiKeyPrincipal {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let request_id = request_id_of(parts);
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let principal = authenticate_api_key(auth_header, &state.api_keys, state.env.dev_allow_all_keys)
            .map_err(|err| GatewayError::new(err, request_id.clone()))?;
        Ok(ApiKeyPrincipal(principal))
    }
}

impl ApiKeyPrincipal {
    pub fn require(self, scope: ApiKeyScope, request_id: &str) -> Result<Principal, GatewayError> {
        require_scope(&self.0, scope).map_err(|err| GatewayError::new(err, request_id.to_string()))?;
        Ok(self.0)
    }
}

/// A caller authenticated either via a session cookie or an admin-scoped
/// API key — the credential model `/admin/*` accepts (spec.md §4.5).
pub struct AdminPrincipal(pub Principal);

impl FromRequestParts<SharedState> for AdminPrincipal {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let request_id = request_id_of(parts);

        if let Some(cookie) = cookie_value(parts, SESSION_COOKIE_NAME) {
            if let Some(session) = state.sessions.validate(cookie).await {
                let principal = Principal::Session {
                    user_id: session.user_id,
                    is_admin: session.is_admin,
                };
                require_admin(&principal).map_err(|err| GatewayError::new(err, request_id.clone()))?;
                return Ok(AdminPrincipal(principal));
            }
        }

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let principal = authenticate_api_key(auth_header, &state.api_keys, state.env.dev_allow_all_keys)
            .map_err(|err| GatewayError::new(err, request_id.clone()))?;
        require_admin(&principal).map_err(|err| GatewayError::new(err, request_id.clone()))?;
        Ok(AdminPrincipal(principal))
    }
}

/// Runs the rate-limit and (for streaming requests) concurrency-slot
/// checks that must clear before a `/v1/*` request proceeds (spec.md
/// §4.5). The returned guard, if any, must be held for the lifetime of
/// the streaming response.
pub fn admit(
    state: &SharedState,
    principal: &Principal,
    is_streaming: bool,
    request_id: &str,
) -> Result<Option<ConcurrencyGuard>, GatewayError> {
    admit_request(&state.rate_limiter, &principal.rate_limit_identifier(), is_streaming)
        .map_err(|err| GatewayError::new(err, request_id.to_string()))
}

/// Shared by the `/v1/*` handlers: API key auth, scope check, then
/// admission. Returns the principal and an optional concurrency guard.
pub async fn authenticate_and_admit(
    state: &SharedState,
    parts: &mut Parts,
    scope: ApiKeyScope,
    is_streaming: bool,
) -> Result<(Principal, Option<ConcurrencyGuard>), GatewayError> {
    let request_id = request_id_of(parts);
    let principal = ApiKeyPrincipal::from_request_parts(parts, state)
        .await?
        .require(scope, &request_id)?;
    let guard = admit(state, &principal, is_streaming, &request_id)?;
    Ok((principal, guard))
}

pub fn model_not_ready_guard() -> CortexError {
    CortexError::new(ErrorKind::ModelNotReady, "model_not_ready")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_cookie(cookie: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/admin/models");
        if let Some(cookie) = cookie {
            builder = builder.header(axum::http::header::COOKIE, cookie);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn cookie_value_finds_the_named_cookie_among_several() {
        let parts = parts_with_cookie(Some("a=1; cortex_session=abc123; b=2"));
        assert_eq!(cookie_value(&parts, SESSION_COOKIE_NAME), Some("abc123"));
    }

    #[test]
    fn cookie_value_is_none_when_the_header_is_absent() {
        let parts = parts_with_cookie(None);
        assert_eq!(cookie_value(&parts, SESSION_COOKIE_NAME), None);
    }

    #[test]
    fn cookie_value_is_none_when_only_other_cookies_are_present() {
        let parts = parts_with_cookie(Some("a=1; b=2"));
        assert_eq!(cookie_value(&parts, SESSION_COOKIE_NAME), None);
    }
}
