//! API key persistence (spec.md §3 `ApiKey`). Hashing itself is owned by
//! `cortex-auth`; this module only stores/looks up already-hashed keys.

use crate::store::{self, Store};
use chrono::Utc;
use cortex_common::error::{CortexError, ErrorKind};
use cortex_values::model::ApiKey;
use std::sync::Arc;

pub struct ApiKeyStore {
    store: Arc<Store>,
}

impl ApiKeyStore {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn insert(&self, key: ApiKey) -> Result<ApiKey, CortexError> {
        let tree = self.store.api_keys().map_err(CortexError::from)?;
        store::put_row(&tree, &key.id.to_be_bytes(), &key).map_err(CortexError::from)?;
        Ok(key)
    }

    pub fn get_by_hash(&self, key_hash: &str) -> Result<ApiKey, CortexError> {
        let tree = self.store.api_keys().map_err(CortexError::from)?;
        store::scan_rows::<ApiKey>(&tree)
            .map_err(CortexError::from)?
            .into_iter()
            .find(|k| k.key_hash == key_hash)
            .ok_or_else(|| CortexError::new(ErrorKind::AuthInvalid, "unknown api key"))
    }

    pub fn touch_last_used(&self, id: i64) -> Result<(), CortexError> {
        let tree = self.store.api_keys().map_err(CortexError::from)?;
        if let Some(mut key) = store::get_row::<ApiKey>(&tree, &id.to_be_bytes()).map_err(CortexError::from)? {
            key.last_used_at = Some(Utc::now());
            store::put_row(&tree, &id.to_be_bytes(), &key).map_err(CortexError::from)?;
        }
        Ok(())
    }

    pub fn disable(&self, id: i64) -> Result<(), CortexError> {
        let tree = self.store.api_keys().map_err(CortexError::from)?;
        let mut key = store::get_row::<ApiKey>(&tree, &id.to_be_bytes())
            .map_err(CortexError::from)?
            .ok_or_else(|| CortexError::new(ErrorKind::ModelNotFound, "unknown api key id"))?;
        key.disabled = true;
        store::put_row(&tree, &id.to_be_bytes(), &key).map_err(CortexError::from)?;
        Ok(())
    }

    pub fn get_by_id(&self, id: i64) -> Result<ApiKey, CortexError> {
        let tree = self.store.api_keys().map_err(CortexError::from)?;
        store::get_row::<ApiKey>(&tree, &id.to_be_bytes())
            .map_err(CortexError::from)?
            .ok_or_else(|| CortexError::new(ErrorKind::ModelNotFound, "unknown api key id"))
    }

    /// Full-row replace, used by the admin `PATCH /admin/keys/{id}` route.
    /// `id`, `key_hash` and `prefix` on `updated` are ignored in favor of
    /// the stored row's values — only scopes/owner/org/expiry/disabled are
    /// caller-mutable.
    pub fn update(&self, id: i64, updated: ApiKey) -> Result<ApiKey, CortexError> {
        let existing = self.get_by_id(id)?;
        let merged = ApiKey {
            id: existing.id,
            key_hash: existing.key_hash,
            prefix: existing.prefix,
            scopes: updated.scopes,
            owner_user_id: updated.owner_user_id,
            organization_id: updated.organization_id,
            expires_at: updated.expires_at,
            disabled: updated.disabled,
            last_used_at: existing.last_used_at,
        };
        let tree = self.store.api_keys().map_err(CortexError::from)?;
        store::put_row(&tree, &id.to_be_bytes(), &merged).map_err(CortexError::from)?;
        Ok(merged)
    }

    pub fn delete(&self, id: i64) -> Result<(), CortexError> {
        let tree = self.store.api_keys().map_err(CortexError::from)?;
        self.get_by_id(id)?;
        tree.remove(id.to_be_bytes())
            .map_err(anyhow::Error::from)
            .map_err(CortexError::from)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<ApiKey>, CortexError> {
        let tree = self.store.api_keys().map_err(CortexError::from)?;
        store::scan_rows::<ApiKey>(&tree).map_err(CortexError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_values::model::ApiKeyScope;

    fn sample(id: i64) -> ApiKey {
        ApiKey {
            id,
            key_hash: format!("hash-{id}"),
            prefix: "sk-abc".into(),
            scopes: vec![ApiKeyScope::ChatCompletions],
            owner_user_id: 1,
            organization_id: None,
            expires_at: None,
            disabled: false,
            last_used_at: None,
        }
    }

    #[test]
    fn lookup_by_hash_finds_inserted_key() {
        let keys = ApiKeyStore::new(Arc::new(Store::open_temporary().unwrap()));
        keys.insert(sample(1)).unwrap();
        let found = keys.get_by_hash("hash-1").unwrap();
        assert_eq!(found.id, 1);
    }

    #[test]
    fn unknown_hash_is_auth_invalid() {
        let keys = ApiKeyStore::new(Arc::new(Store::open_temporary().unwrap()));
        let err = keys.get_by_hash("missing").unwrap_err();
        assert_eq!(err.kind(), cortex_common::error::ErrorKind::AuthInvalid);
    }

    #[test]
    fn disable_marks_key_unusable() {
        let keys = ApiKeyStore::new(Arc::new(Store::open_temporary().unwrap()));
        keys.insert(sample(1)).unwrap();
        keys.disable(1).unwrap();
        assert!(keys.get_by_hash("hash-1").unwrap().disabled);
    }
}
