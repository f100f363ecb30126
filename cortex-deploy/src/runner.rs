//! The background job runner itself: at most one active job per kind,
//! cooperative cancellation, and a durable summary row so a status query
//! mid-job (or shortly after a restart) returns the last known state
//! (spec.md §4.10). Grounded on `cortex-registry`'s `DashMap`-guarded
//! per-model lock idiom (`registry.rs`'s `locks` field), generalized from
//! "one lock per model id" to "one active job per kind".

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use cortex_common::error::{CortexError, ErrorKind};
use cortex_registry::store::{self, Store};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::job::{JobKind, JobKindTag, JobStatus, JobSummary};

const TREE_JOBS: &str = "deploy_jobs";

struct JobHandle {
    cancel: CancellationToken,
    summary: Mutex<JobSummary>,
}

/// Handed to the job's work closure; the only way the closure touches
/// shared job state.
#[derive(Clone)]
pub struct JobContext {
    id: i64,
    handle: Arc<JobHandle>,
    store: Arc<Store>,
}

impl JobContext {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.cancel.is_cancelled()
    }

    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.handle.cancel.cancelled()
    }

    pub fn set_step(&self, step: impl Into<String>) {
        self.mutate(|summary| summary.step = step.into());
    }

    pub fn set_progress(&self, fraction: f64) {
        self.mutate(|summary| summary.progress = fraction.clamp(0.0, 1.0));
    }

    pub fn set_total_bytes(&self, total: u64) {
        self.mutate(|summary| summary.total_bytes = Some(total));
    }

    pub fn add_bytes_written(&self, delta: u64) {
        self.mutate(|summary| summary.bytes_written += delta);
    }

    pub fn log(&self, line: impl Into<String>) {
        self.mutate(|summary| summary.push_log(line));
    }

    fn mutate(&self, f: impl FnOnce(&mut JobSummary)) {
        let mut summary = self.handle.summary.lock();
        f(&mut summary);
        summary.updated_at = Utc::now();
        let snapshot = summary.clone();
        drop(summary);
        self.persist(&snapshot);
    }

    fn persist(&self, summary: &JobSummary) {
        if let Ok(tree) = self.store.open_tree(TREE_JOBS) {
            if let Err(err) = store::put_row(&tree, summary.id.to_string().as_bytes(), summary) {
                tracing::warn!(job_id = summary.id, error = %err, "failed to persist job summary");
            }
        }
    }
}

pub struct JobRunner {
    store: Arc<Store>,
    jobs: Arc<DashMap<i64, Arc<JobHandle>>>,
    active_by_kind: Arc<DashMap<JobKindTag, i64>>,
}

impl JobRunner {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            jobs: Arc::new(DashMap::new()),
            active_by_kind: Arc::new(DashMap::new()),
        }
    }

    /// Submits `work` to run on its own task. Rejects with `state_conflict`
    /// if a job of the same kind is already active.
    pub fn submit<F, Fut>(&self, kind: JobKind, work: F) -> Result<i64, CortexError>
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let tag = kind.tag();
        if self.active_by_kind.contains_key(&tag) {
            return Err(CortexError::new(
                ErrorKind::StateConflict,
                format!("a {tag:?} job is already running"),
            ));
        }

        let id = self.store.next_id().map_err(CortexError::from)?;
        let now = Utc::now();
        let summary = JobSummary::new(id, kind, now);
        let handle = Arc::new(JobHandle {
            cancel: CancellationToken::new(),
            summary: Mutex::new(summary.clone()),
        });

        self.jobs.insert(id, handle.clone());
        self.active_by_kind.insert(tag, id);

        let ctx = JobContext { id, handle: handle.clone(), store: self.store.clone() };
        ctx.persist(&summary);
        ctx.mutate(|s| s.status = JobStatus::Running);

        let runner_jobs = self.jobs.clone();
        let runner_active = self.active_by_kind.clone();
        tokio::spawn(async move {
            let result = work(ctx.clone()).await;
            let final_status = if ctx.is_cancelled() {
                JobStatus::Cancelled
            } else {
                match &result {
                    Ok(()) => JobStatus::Completed,
                    Err(_) => JobStatus::Failed,
                }
            };
            ctx.mutate(|s| {
                s.status = final_status;
                s.progress = if final_status == JobStatus::Completed { 1.0 } else { s.progress };
                if let Err(err) = &result {
                    s.error = Some(err.to_string());
                }
            });
            runner_active.remove(&tag);
            runner_jobs.remove(&id);
        });

        Ok(id)
    }

    pub fn cancel(&self, id: i64) -> Result<(), CortexError> {
        let handle = self
            .jobs
            .get(&id)
            .ok_or_else(|| CortexError::new(ErrorKind::ModelNotFound, format!("no active job {id}")))?;
        handle.cancel.cancel();
        Ok(())
    }

    /// Reads the current summary, whether from an in-memory active job or
    /// (for a job that finished or was running before a restart) the
    /// durable row.
    pub fn status(&self, id: i64) -> Result<JobSummary, CortexError> {
        if let Some(handle) = self.jobs.get(&id) {
            return Ok(handle.summary.lock().clone());
        }
        let tree = self.store.open_tree(TREE_JOBS).map_err(CortexError::from)?;
        store::get_row(&tree, id.to_string().as_bytes())
            .map_err(CortexError::from)?
            .ok_or_else(|| CortexError::new(ErrorKind::ModelNotFound, format!("no job {id}")))
    }

    pub fn list(&self) -> Result<Vec<JobSummary>, CortexError> {
        let tree = self.store.open_tree(TREE_JOBS).map_err(CortexError::from)?;
        store::scan_rows(&tree).map_err(CortexError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobKind;
    use std::time::Duration;

    fn test_store() -> Arc<Store> {
        Arc::new(Store::open_temporary().unwrap())
    }

    #[tokio::test]
    async fn completed_job_reaches_full_progress() {
        let runner = JobRunner::new(test_store());
        let id = runner
            .submit(JobKind::ExportInstance, |ctx| async move {
                ctx.set_step("writing manifest");
                ctx.set_progress(0.5);
                ctx.add_bytes_written(1024);
                Ok(())
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let summary = runner.status(id).unwrap();
        assert_eq!(summary.status, JobStatus::Completed);
        assert_eq!(summary.progress, 1.0);
        assert_eq!(summary.bytes_written, 1024);
    }

    #[tokio::test]
    async fn second_job_of_same_kind_is_rejected_while_active() {
        let runner = JobRunner::new(test_store());
        let _id = runner
            .submit(JobKind::ExportInstance, |ctx| async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                let _ = ctx;
                Ok(())
            })
            .unwrap();

        let result = runner.submit(JobKind::ExportInstance, |_ctx| async move { Ok(()) });
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), ErrorKind::StateConflict);
    }

    #[tokio::test]
    async fn different_kinds_run_concurrently() {
        let runner = JobRunner::new(test_store());
        let a = runner.submit(JobKind::ExportInstance, |_ctx| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        });
        let b = runner.submit(JobKind::RestoreDatabase { archive_path: "x.tar".into() }, |_ctx| async move {
            Ok(())
        });
        assert!(a.is_ok());
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn cancelled_job_is_marked_cancelled() {
        let runner = JobRunner::new(test_store());
        let id = runner
            .submit(JobKind::ImportModel { manifest_path: "m.json".into() }, |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .unwrap();

        runner.cancel(id).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let summary = runner.status(id).unwrap();
        assert_eq!(summary.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn failed_job_records_error_text() {
        let runner = JobRunner::new(test_store());
        let id = runner
            .submit(JobKind::ExportModel { model_id: 1 }, |_ctx| async move {
                anyhow::bail!("disk full")
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let summary = runner.status(id).unwrap();
        assert_eq!(summary.status, JobStatus::Failed);
        assert_eq!(summary.error.as_deref(), Some("disk full"));
    }
}
