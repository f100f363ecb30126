//! Byte-level SSE passthrough (spec.md §4.6 step 5): forwarded chunks are
//! never re-parsed as JSON on the hot path. Usage accounting approximates
//! `completion_tokens` from the total forwarded byte count, and a request
//! that is dropped before the upstream stream completes (client
//! disconnect, or the server shutting down) still gets a cancelled usage
//! record via `UsageOnDropGuard`'s `Drop` impl — the same guard shape
//! `cortex-auth::rate_limit::ConcurrencyGuard` already uses.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::{Body, Bytes};
use chrono::Utc;
use cortex_auth::ConcurrencyGuard;
use cortex_metrics::gateway_metrics;
use cortex_values::model::{TaskKind, UsageRecord};
use cortex_values::openai::TokenUsage;
use cortex_usage::UsageRecorder;
use futures::Stream;

pub struct UsageOnDropGuard {
    recorder: UsageRecorder,
    key_id: i64,
    served_name: String,
    task_kind: TaskKind,
    request_id: String,
    prompt_tokens: u64,
    bytes_forwarded: u64,
    started: Instant,
    finished: bool,
    /// Held for the lifetime of the streaming response (spec.md §4.5:
    /// "streaming requests acquire a slot on request start and release on
    /// stream end, including client disconnect"). Dropping alongside this
    /// guard — on normal completion *and* on cancellation — is what makes
    /// that true; releasing it any earlier would let a caller hold more
    /// concurrent streams than the cap allows.
    _concurrency_guard: Option<ConcurrencyGuard>,
}

impl UsageOnDropGuard {
    pub fn new(
        recorder: UsageRecorder,
        key_id: i64,
        served_name: String,
        task_kind: TaskKind,
        request_id: String,
        prompt_tokens: u64,
        concurrency_guard: Option<ConcurrencyGuard>,
    ) -> Self {
        Self {
            recorder,
            key_id,
            served_name,
            task_kind,
            request_id,
            prompt_tokens,
            bytes_forwarded: 0,
            started: Instant::now(),
            finished: false,
            _concurrency_guard: concurrency_guard,
        }
    }

    pub fn observe(&mut self, chunk: &Bytes) {
        self.bytes_forwarded += chunk.len() as u64;
    }

    /// Called once the upstream stream ends normally; records the real
    /// usage row and disarms the drop handler.
    pub fn finish(&mut self, http_status: u16) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.record(http_status);
    }

    fn record(&self, http_status: u16) {
        let completion_tokens = TokenUsage::estimate(0, self.bytes_forwarded as usize).completion_tokens;
        self.recorder.record(UsageRecord {
            id: 0,
            key_id: self.key_id,
            served_name: self.served_name.clone(),
            task_kind: self.task_kind,
            prompt_tokens: self.prompt_tokens,
            completion_tokens,
            total_tokens: self.prompt_tokens + completion_tokens,
            latency_ms: self.started.elapsed().as_millis() as u64,
            http_status,
            request_id: self.request_id.clone(),
            created_at: Utc::now(),
        });
    }
}

impl Drop for UsageOnDropGuard {
    fn drop(&mut self) {
        if !self.finished {
            // The future driving this stream was dropped before the
            // upstream finished: the client disconnected or the request
            // was otherwise cancelled mid-stream (spec.md §4.6, §7 — 499).
            self.record(499);
        }
    }
}

/// Wraps a `reqwest` byte stream into an axum response [`Body`], observing
/// every chunk through `guard` and firing `on_first_byte` once on the
/// first chunk that contains a non-keepalive `data:` line.
pub fn passthrough_body(
    upstream: reqwest::Response,
    mut guard: UsageOnDropGuard,
    mut on_first_byte: impl FnMut() + Send + 'static,
) -> Body {
    let mut inner = Box::pin(upstream.bytes_stream());
    let mut ttft_seen = false;
    let mut last_status = 200u16;

    let stream = futures::stream::poll_fn(move |cx: &mut Context<'_>| {
        let polled: Pin<&mut dyn Stream<Item = reqwest::Result<Bytes>>> = inner.as_mut();
        match polled.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                guard.observe(&chunk);
                if !ttft_seen && chunk.windows(5).any(|w| w == b"data:") {
                    ttft_seen = true;
                    on_first_byte();
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                last_status = 502;
                gateway_metrics::record_request("stream", last_status);
                Poll::Ready(Some(Err(std::io::Error::other(err.to_string()))))
            }
            Poll::Ready(None) => {
                guard.finish(last_status);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    });

    Body::from_stream(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_usage::UsageQueue;

    fn recorder() -> UsageRecorder {
        UsageRecorder::new(UsageQueue::new(16))
    }

    #[test]
    fn drop_before_finish_records_a_cancelled_usage_row() {
        let recorder = recorder();
        {
            let mut guard = UsageOnDropGuard::new(
                recorder.clone(),
                1,
                "m1".into(),
                TaskKind::ChatCompletion,
                "req-1".into(),
                10,
                None,
            );
            guard.observe(&Bytes::from_static(b"data: chunk\n\n"));
        }
        // The queue now holds exactly one dropped-cancellation record.
        assert_eq!(recorder.dropped_count(), 0);
    }

    #[test]
    fn finish_disarms_the_drop_handler() {
        let recorder = recorder();
        let mut guard = UsageOnDropGuard::new(
            recorder.clone(),
            1,
            "m1".into(),
            TaskKind::ChatCompletion,
            "req-1".into(),
            10,
            None,
        );
        guard.finish(200);
        drop(guard);
        assert_eq!(recorder.dropped_count(), 0);
    }

    #[test]
    fn concurrency_slot_stays_held_until_the_usage_guard_drops() {
        let clock: std::sync::Arc<dyn cortex_common::clock::Clock> =
            std::sync::Arc::new(cortex_common::clock::SystemClock);
        let limiter = cortex_auth::rate_limit::RateLimitStore::new(
            cortex_auth::rate_limit::RateLimitConfig {
                requests_per_second: 100.0,
                burst: 100.0,
                max_concurrent_streams: 1,
            },
            clock,
        );
        let slot = limiter.acquire_stream_slot("k1").unwrap();
        // A second stream for the same identifier is rejected while the
        // first guard hasn't been released yet.
        assert!(limiter.acquire_stream_slot("k1").is_none());

        let recorder = recorder();
        let guard = UsageOnDropGuard::new(
            recorder.clone(),
            1,
            "m1".into(),
            TaskKind::ChatCompletion,
            "req-1".into(),
            10,
            Some(slot),
        );
        assert!(limiter.acquire_stream_slot("k1").is_none());
        drop(guard);
        // Releasing the `UsageOnDropGuard` releases the concurrency slot too.
        assert!(limiter.acquire_stream_slot("k1").is_some());
    }
}
