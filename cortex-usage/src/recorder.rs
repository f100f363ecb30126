//! The worker pool that drains [`UsageQueue`] into the registry's durable
//! usage tree (spec.md §4.7), retrying store failures with exponential
//! backoff instead of dropping a record the first time the store hiccups.

use crate::queue::UsageQueue;
use cortex_common::retry::Backoff;
use cortex_registry::UsageStore;
use cortex_values::model::UsageRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Front door for request handlers: pushing never blocks or fails visibly
/// to the caller (spec.md §4.7 — "must not block the hot path").
#[derive(Clone)]
pub struct UsageRecorder {
    queue: Arc<UsageQueue>,
}

impl UsageRecorder {
    pub fn new(queue: Arc<UsageQueue>) -> Self {
        Self { queue }
    }

    pub fn record(&self, record: UsageRecord) {
        self.queue.push(record);
    }

    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped_count()
    }
}

pub struct WorkerPool {
    queue: Arc<UsageQueue>,
    store: Arc<UsageStore>,
    worker_count: usize,
    max_retry_delay: Duration,
}

impl WorkerPool {
    pub fn new(queue: Arc<UsageQueue>, store: Arc<UsageStore>, worker_count: usize) -> Self {
        Self {
            queue,
            store,
            worker_count: worker_count.max(1),
            max_retry_delay: Duration::from_secs(30),
        }
    }

    /// Spawns the fixed worker pool; each worker runs until `shutdown` is
    /// cancelled, finishing any record it is mid-write on.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.worker_count)
            .map(|worker_id| {
                let pool = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.run_worker(worker_id, shutdown).await })
            })
            .collect()
    }

    async fn run_worker(&self, worker_id: usize, shutdown: CancellationToken) {
        loop {
            let record = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(worker_id, "usage worker shutting down");
                    return;
                }
                record = self.queue.pop() => record,
            };
            self.write_with_retry(record).await;
        }
    }

    async fn write_with_retry(&self, record: UsageRecord) {
        let mut backoff = Backoff::new(Duration::from_millis(50), self.max_retry_delay);
        loop {
            match self.store.append(&record) {
                Ok(()) => {
                    metrics::counter!("cortex_usage_writes_total").increment(1);
                    return;
                }
                Err(err) => {
                    metrics::counter!("cortex_usage_write_retries_total").increment(1);
                    tracing::warn!(error = %err, request_id = %record.request_id, "usage write failed, retrying");
                    tokio::time::sleep(backoff.next_delay()).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cortex_registry::Store;
    use cortex_values::model::TaskKind;

    fn sample() -> UsageRecord {
        UsageRecord {
            id: 0,
            key_id: 1,
            served_name: "m1".into(),
            task_kind: TaskKind::ChatCompletion,
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 2,
            latency_ms: 10,
            http_status: 200,
            request_id: "req-1".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn queued_records_are_eventually_durably_written() {
        let queue = UsageQueue::new(16);
        let store = Arc::new(UsageStore::new(Arc::new(Store::open_temporary().unwrap())));
        let pool = Arc::new(WorkerPool::new(queue.clone(), store.clone(), 2));
        let shutdown = CancellationToken::new();
        let handles = pool.spawn(shutdown.clone());

        let recorder = UsageRecorder::new(queue.clone());
        recorder.record(sample());

        tokio::time::timeout(Duration::from_secs(1), async {
            while store.list_for_key(1).unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("record should be written within the timeout");

        shutdown.cancel();
        for h in handles {
            let _ = h.await;
        }
    }

    #[test]
    fn recorder_exposes_overflow_count() {
        let queue = UsageQueue::new(1);
        let recorder = UsageRecorder::new(queue);
        recorder.record(sample());
        recorder.record(sample());
        assert_eq!(recorder.dropped_count(), 1);
    }
}
