//! Auth & Rate Limit (C5): verifies API keys and session cookies at the
//! public surface, then enforces per-identifier rate limits (spec.md §4.5).

pub mod hashing;
pub mod rate_limit;
pub mod session;

pub use hashing::{generate_api_key, hash_api_key};
pub use rate_limit::{ConcurrencyGuard, RateLimitConfig, RateLimitStore};
pub use session::{SessionPrincipal, SessionStore};

use cortex_common::error::{CortexError, ErrorKind};
use cortex_registry::ApiKeyStore;
use cortex_values::model::{ApiKey, ApiKeyScope};
use std::sync::Arc;

/// The authenticated caller behind a request, resolved from either an API
/// key (`/v1/*`) or a session cookie (`/admin/*`, chat endpoints).
#[derive(Debug, Clone)]
pub enum Principal {
    ApiKey { key: ApiKey },
    Session { user_id: i64, is_admin: bool },
}

impl Principal {
    /// The stable identifier rate limiting keys its counters on.
    pub fn rate_limit_identifier(&self) -> String {
        match self {
            Principal::ApiKey { key } => format!("key:{}", key.id),
            Principal::Session { user_id, .. } => format!("user:{user_id}"),
        }
    }
}

/// Verifies a bearer token against the key store. Parses `Authorization:
/// Bearer <token>`; a development escape hatch (`dev_allow_all_keys`)
/// fabricates an admin-scoped principal for any non-empty bearer and must
/// never be enabled in production (spec.md §4.5).
pub fn authenticate_api_key(
    authorization_header: Option<&str>,
    keys: &ApiKeyStore,
    dev_allow_all_keys: bool,
) -> Result<Principal, CortexError> {
    let token = authorization_header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CortexError::new(ErrorKind::AuthMissing, "missing bearer token"))?;

    if dev_allow_all_keys {
        tracing::warn!("GATEWAY_DEV_ALLOW_ALL_KEYS is enabled; accepting any bearer token");
        return Ok(Principal::ApiKey {
            key: ApiKey {
                id: 0,
                key_hash: String::new(),
                prefix: "dev".into(),
                scopes: vec![ApiKeyScope::ChatCompletions, ApiKeyScope::Embeddings, ApiKeyScope::Admin],
                owner_user_id: 0,
                organization_id: None,
                expires_at: None,
                disabled: false,
                last_used_at: None,
            },
        });
    }

    let hash = hashing::hash_api_key(token);
    let key = keys.get_by_hash(&hash)?;
    if key.disabled {
        return Err(CortexError::new(ErrorKind::AuthInvalid, "api key is disabled"));
    }
    if !key.is_usable(chrono::Utc::now()) {
        return Err(CortexError::new(ErrorKind::AuthExpired, "api key has expired"));
    }
    keys.touch_last_used(key.id)?;
    Ok(Principal::ApiKey { key })
}

/// Scope enforcement for `/v1/*` routes (spec.md §4.5): the session path
/// bypasses this and is checked for the `admin` role instead.
pub fn require_scope(principal: &Principal, scope: ApiKeyScope) -> Result<(), CortexError> {
    match principal {
        Principal::ApiKey { key } if key.has_scope(scope) => Ok(()),
        Principal::ApiKey { .. } => Err(CortexError::new(ErrorKind::AuthScope, "api key lacks required scope")),
        Principal::Session { is_admin, .. } if *is_admin => Ok(()),
        Principal::Session { .. } => Err(CortexError::new(ErrorKind::AuthScope, "session lacks required scope")),
    }
}

pub fn require_admin(principal: &Principal) -> Result<(), CortexError> {
    match principal {
        Principal::Session { is_admin: true, .. } => Ok(()),
        Principal::ApiKey { key } if key.has_scope(ApiKeyScope::Admin) => Ok(()),
        _ => Err(CortexError::new(ErrorKind::AuthScope, "admin role required")),
    }
}

/// Wires the rate-limit + concurrency checks an inbound request must clear
/// before reaching the router (spec.md §4.5 steps). Returns a guard whose
/// `Drop` releases the concurrency slot when the streaming response ends
/// (including client disconnect).
pub fn admit_request(
    limiter: &RateLimitStore,
    identifier: &str,
    is_streaming: bool,
) -> Result<Option<ConcurrencyGuard>, CortexError> {
    if !limiter.allow(identifier) {
        return Err(CortexError::new(ErrorKind::RateLimited, "rate limit exceeded"));
    }
    if !is_streaming {
        return Ok(None);
    }
    limiter
        .acquire_stream_slot(identifier)
        .map(Some)
        .ok_or_else(|| CortexError::new(ErrorKind::ConcurrencyExceeded, "too many concurrent streams"))
}

pub type SharedApiKeyStore = Arc<ApiKeyStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_registry::Store;

    fn keystore() -> ApiKeyStore {
        ApiKeyStore::new(Arc::new(Store::open_temporary().unwrap()))
    }

    #[test]
    fn missing_header_is_auth_missing() {
        let err = authenticate_api_key(None, &keystore(), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthMissing);
    }

    #[test]
    fn dev_escape_hatch_accepts_any_bearer() {
        let principal = authenticate_api_key(Some("Bearer anything"), &keystore(), true).unwrap();
        assert!(require_admin(&principal).is_ok());
    }

    #[test]
    fn unknown_token_is_auth_invalid() {
        let err = authenticate_api_key(Some("Bearer sk-does-not-exist"), &keystore(), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthInvalid);
    }

    #[test]
    fn scope_check_rejects_key_without_requested_scope() {
        let keys = keystore();
        let (raw, hash, prefix) = generate_api_key();
        let _ = prefix;
        let key = keys
            .insert(ApiKey {
                id: 1,
                key_hash: hash,
                prefix: "sk-abc".into(),
                scopes: vec![ApiKeyScope::Embeddings],
                owner_user_id: 1,
                organization_id: None,
                expires_at: None,
                disabled: false,
                last_used_at: None,
            })
            .unwrap();
        let _ = key;
        let principal = authenticate_api_key(Some(&format!("Bearer {raw}")), &keys, false).unwrap();
        assert!(require_scope(&principal, ApiKeyScope::ChatCompletions).is_err());
        assert!(require_scope(&principal, ApiKeyScope::Embeddings).is_ok());
    }
}
