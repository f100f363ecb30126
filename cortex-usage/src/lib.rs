//! Usage Recorder (C7): queues usage writes off the hot path and drains
//! them with a small worker pool, retrying durable-store failures with
//! exponential backoff and dropping the oldest entry on overflow — exactly
//! the shape spec.md §4.7 describes, grounded on the teacher's own
//! `tokio::spawn`-pool idiom for background work.

pub mod queue;
pub mod recorder;

pub use queue::UsageQueue;
pub use recorder::{UsageRecorder, WorkerPool};
