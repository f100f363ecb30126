//! Deployment Job Runner (C10): export/import/restore as background jobs
//! with progress, cancellation and a durable status row (spec.md §4.10).

pub mod job;
pub mod runner;

pub use job::{JobKind, JobKindTag, JobStatus, JobSummary};
pub use runner::{JobContext, JobRunner};
