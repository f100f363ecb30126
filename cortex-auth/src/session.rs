//! Session-cookie validation for `/admin/*` and chat-playground endpoints
//! (spec.md §4.5). The session store itself is an external collaborator
//! per spec.md §1/§9 ("chat-session persistence ... specified only as an
//! external session-store interface"); this crate only defines the trait
//! CORTEX's own code is written against, plus an in-memory implementation
//! good enough for a single control host and for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPrincipal {
    pub user_id: i64,
    pub is_admin: bool,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn validate(&self, cookie_value: &str) -> Option<SessionPrincipal>;
}

#[derive(Debug, Clone)]
struct SessionRecord {
    principal: SessionPrincipal,
    expires_at: DateTime<Utc>,
}

/// In-memory session store. A networked store (Redis, a relational
/// sessions table) can implement the same [`SessionStore`] trait without
/// touching call sites, the same seam `cortex-auth::rate_limit` uses for
/// its counter backend.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, SessionRecord>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, cookie_value: impl Into<String>, principal: SessionPrincipal, ttl: chrono::Duration) {
        self.sessions.insert(
            cookie_value.into(),
            SessionRecord {
                principal,
                expires_at: Utc::now() + ttl,
            },
        );
    }

    pub fn revoke(&self, cookie_value: &str) {
        self.sessions.remove(cookie_value);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn validate(&self, cookie_value: &str) -> Option<SessionPrincipal> {
        let record = self.sessions.get(cookie_value)?;
        if record.expires_at < Utc::now() {
            drop(record);
            self.sessions.remove(cookie_value);
            return None;
        }
        Some(record.principal.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn valid_session_resolves_to_its_principal() {
        let store = InMemorySessionStore::new();
        store.create(
            "cookie-1",
            SessionPrincipal { user_id: 7, is_admin: true },
            chrono::Duration::hours(1),
        );
        let principal = store.validate("cookie-1").await.unwrap();
        assert_eq!(principal.user_id, 7);
        assert!(principal.is_admin);
    }

    #[tokio::test]
    async fn expired_session_is_rejected_and_evicted() {
        let store = InMemorySessionStore::new();
        store.create(
            "cookie-1",
            SessionPrincipal { user_id: 7, is_admin: false },
            chrono::Duration::seconds(-1),
        );
        assert!(store.validate("cookie-1").await.is_none());
        assert!(store.sessions.is_empty());
    }

    #[tokio::test]
    async fn unknown_cookie_resolves_to_none() {
        let store = InMemorySessionStore::new();
        assert!(store.validate("missing").await.is_none());
    }
}
