//! Thin `sled` wrapper: one tree per relational table from spec.md §6
//! (`models`, `api_keys`, `usage`, `config_kv`), rows serialized as JSON.
//!
//! `sled` substitutes for the teacher's `libmdbx`+`rkyv` storage stack —
//! see DESIGN.md for the rationale. Both are embedded, transactional,
//! single-host stores; CORTEX only needs the simpler relational-row shape,
//! not the teacher's zero-copy archive format.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

pub struct Store {
    db: sled::Db,
}

const TREE_MODELS: &str = "models";
const TREE_API_KEYS: &str = "api_keys";
const TREE_USAGE: &str = "usage";
const TREE_CONFIG_KV: &str = "config_kv";
const KEY_NEXT_ID: &[u8] = b"__next_id";

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path).context("opening sled registry store")?;
        Ok(Self { db })
    }

    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .context("opening temporary sled registry store")?;
        Ok(Self { db })
    }

    fn tree(&self, name: &str) -> Result<sled::Tree> {
        self.db.open_tree(name).context("opening sled tree")
    }

    /// Opens an arbitrary named tree. For tables owned by this crate,
    /// prefer the dedicated accessor (`models()`, `api_keys()`, ...);
    /// this exists so other crates (e.g. the deployment job runner) can
    /// keep their own rows in the same embedded store without CORTEX
    /// taking on a dependency edge back onto them.
    pub fn open_tree(&self, name: &str) -> Result<sled::Tree> {
        self.tree(name)
    }

    pub fn models(&self) -> Result<sled::Tree> {
        self.tree(TREE_MODELS)
    }

    pub fn api_keys(&self) -> Result<sled::Tree> {
        self.tree(TREE_API_KEYS)
    }

    pub fn usage(&self) -> Result<sled::Tree> {
        self.tree(TREE_USAGE)
    }

    pub fn config_kv(&self) -> Result<sled::Tree> {
        self.tree(TREE_CONFIG_KV)
    }

    /// Monotonically increasing id, shared across tables per the teacher's
    /// preference for a single sequence rather than per-table counters.
    pub fn next_id(&self) -> Result<i64> {
        let kv = self.config_kv()?;
        let next = kv.update_and_fetch(KEY_NEXT_ID, |old| {
            let current = old
                .and_then(|bytes| bytes.try_into().ok())
                .map(i64::from_be_bytes)
                .unwrap_or(0);
            Some((current + 1).to_be_bytes().to_vec())
        })?;
        let bytes = next.context("next_id update produced no value")?;
        Ok(i64::from_be_bytes(bytes.as_ref().try_into()?))
    }
}

pub fn put_row<T: Serialize>(tree: &sled::Tree, key: &[u8], value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value).context("serializing row")?;
    tree.insert(key, bytes).context("writing row")?;
    Ok(())
}

pub fn get_row<T: DeserializeOwned>(tree: &sled::Tree, key: &[u8]) -> Result<Option<T>> {
    match tree.get(key).context("reading row")? {
        Some(bytes) => Ok(Some(
            serde_json::from_slice(&bytes).context("deserializing row")?,
        )),
        None => Ok(None),
    }
}

pub fn scan_rows<T: DeserializeOwned>(tree: &sled::Tree) -> Result<Vec<T>> {
    tree.iter()
        .values()
        .map(|res| {
            let bytes = res.context("scanning tree")?;
            serde_json::from_slice(&bytes).context("deserializing scanned row")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_id_increments_monotonically() {
        let store = Store::open_temporary().unwrap();
        assert_eq!(store.next_id().unwrap(), 1);
        assert_eq!(store.next_id().unwrap(), 2);
        assert_eq!(store.next_id().unwrap(), 3);
    }

    #[test]
    fn put_and_get_round_trip() {
        let store = Store::open_temporary().unwrap();
        let tree = store.models().unwrap();
        put_row(&tree, b"1", &"hello".to_string()).unwrap();
        let loaded: Option<String> = get_row(&tree, b"1").unwrap();
        assert_eq!(loaded, Some("hello".to_string()));
    }
}
