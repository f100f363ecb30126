//! Health Poller (C3): probes non-archived, container-bearing models on a
//! fixed interval and maintains the in-memory health/readiness snapshots
//! the selector and the gateway read (spec.md §4.3).

pub mod poller;
pub mod snapshots;

pub use poller::{HealthPoller, PollerConfig};
pub use snapshots::SnapshotStore;
