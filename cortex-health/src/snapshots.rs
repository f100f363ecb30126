//! Per-backend health snapshot storage, keyed by base URL (spec.md §3, §5).

use cortex_values::model::{HealthSnapshot, ProbeStatus};
use dashmap::DashMap;

#[derive(Default)]
pub struct SnapshotStore {
    snapshots: DashMap<String, HealthSnapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, base_url: &str) -> HealthSnapshot {
        self.snapshots
            .entry(base_url.to_string())
            .or_insert_with(|| HealthSnapshot::new(base_url))
            .clone()
    }

    pub fn record_probe(&self, base_url: &str, status: ProbeStatus, latency_ms: f64, now: chrono::DateTime<chrono::Utc>) {
        let mut snapshot = self.get(base_url);
        snapshot.last_probe_at = Some(now);
        snapshot.last_status = status;
        snapshot.consecutive_failures = match status {
            ProbeStatus::Healthy => 0,
            ProbeStatus::Unhealthy | ProbeStatus::Unknown => snapshot.consecutive_failures + 1,
        };
        // Exponentially weighted rolling average, cheap and bounded.
        snapshot.rolling_latency_ms = if snapshot.rolling_latency_ms == 0.0 {
            latency_ms
        } else {
            0.8 * snapshot.rolling_latency_ms + 0.2 * latency_ms
        };
        self.snapshots.insert(base_url.to_string(), snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn consecutive_failures_reset_on_success() {
        let store = SnapshotStore::new();
        store.record_probe("http://b1", ProbeStatus::Unhealthy, 10.0, Utc::now());
        store.record_probe("http://b1", ProbeStatus::Unhealthy, 10.0, Utc::now());
        assert_eq!(store.get("http://b1").consecutive_failures, 2);
        store.record_probe("http://b1", ProbeStatus::Healthy, 10.0, Utc::now());
        assert_eq!(store.get("http://b1").consecutive_failures, 0);
    }

    #[test]
    fn unknown_backend_defaults_to_unknown_status() {
        let store = SnapshotStore::new();
        assert_eq!(store.get("http://never-probed").last_status, ProbeStatus::Unknown);
    }
}
