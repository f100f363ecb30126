//! The bounded in-process buffer between request handlers and the durable
//! write path (spec.md §4.7): "writes are queued on an in-process buffered
//! channel ... on overflow the oldest entries are dropped and a counter is
//! incremented (observable)".

use cortex_values::model::UsageRecord;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub struct UsageQueue {
    inner: Mutex<VecDeque<UsageRecord>>,
    capacity: usize,
    dropped: AtomicU64,
    notify: Notify,
}

impl UsageQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
        })
    }

    /// Never blocks: a full queue drops its oldest entry to make room,
    /// per spec.md §4.7 — the hot path must never wait on this call.
    pub fn push(&self, record: UsageRecord) {
        {
            let mut queue = self.inner.lock();
            if queue.len() >= self.capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("cortex_usage_queue_overflow_total").increment(1);
            }
            queue.push_back(record);
        }
        self.notify.notify_one();
    }

    /// Pops the oldest queued record, waiting for one to arrive if empty.
    pub async fn pop(&self) -> UsageRecord {
        loop {
            if let Some(record) = self.inner.lock().pop_front() {
                return record;
            }
            self.notify.notified().await;
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cortex_values::model::TaskKind;

    fn sample(id: i64) -> UsageRecord {
        UsageRecord {
            id,
            key_id: 1,
            served_name: "m1".into(),
            task_kind: TaskKind::ChatCompletion,
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 2,
            latency_ms: 10,
            http_status: 200,
            request_id: format!("req-{id}"),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn pop_returns_in_fifo_order() {
        let queue = UsageQueue::new(10);
        queue.push(sample(1));
        queue.push(sample(2));
        assert_eq!(queue.pop().await.id, 1);
        assert_eq!(queue.pop().await.id, 2);
    }

    #[test]
    fn overflow_drops_oldest_and_increments_counter() {
        let queue = UsageQueue::new(2);
        queue.push(sample(1));
        queue.push(sample(2));
        queue.push(sample(3));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped_count(), 1);
        let ids: Vec<i64> = {
            let inner = queue.inner.lock();
            inner.iter().map(|r| r.id).collect()
        };
        assert_eq!(ids, vec![2, 3]);
    }
}
