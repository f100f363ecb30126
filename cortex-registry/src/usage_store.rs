//! Append-only usage persistence (spec.md §4.7). The recorder in
//! `cortex-usage` owns the queue/backoff machinery; this module is just
//! the durable sink it writes through.

use crate::store::{self, Store};
use cortex_common::error::CortexError;
use cortex_values::model::UsageRecord;
use std::sync::Arc;

pub struct UsageStore {
    store: Arc<Store>,
}

impl UsageStore {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn append(&self, record: &UsageRecord) -> Result<(), CortexError> {
        let tree = self.store.usage().map_err(CortexError::from)?;
        let id = self.store.next_id().map_err(CortexError::from)?;
        store::put_row(&tree, &id.to_be_bytes(), record).map_err(CortexError::from)?;
        Ok(())
    }

    pub fn list_for_key(&self, key_id: i64) -> Result<Vec<UsageRecord>, CortexError> {
        let tree = self.store.usage().map_err(CortexError::from)?;
        let mut rows = store::scan_rows::<UsageRecord>(&tree).map_err(CortexError::from)?;
        rows.retain(|r| r.key_id == key_id);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cortex_values::model::TaskKind;

    fn sample() -> UsageRecord {
        UsageRecord {
            id: 0,
            key_id: 7,
            served_name: "llama-3-8b".into(),
            task_kind: TaskKind::ChatCompletion,
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            latency_ms: 120,
            http_status: 200,
            request_id: "req-1".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn appended_records_are_listed_by_key() {
        let store = UsageStore::new(Arc::new(Store::open_temporary().unwrap()));
        store.append(&sample()).unwrap();
        store.append(&sample()).unwrap();
        assert_eq!(store.list_for_key(7).unwrap().len(), 2);
        assert!(store.list_for_key(99).unwrap().is_empty());
    }
}
