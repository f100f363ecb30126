//! Rate limiting (spec.md §4.5, testable property #8): a sliding-window
//! RPS cap implemented as a token bucket (equivalent guarantee, simpler to
//! reason about) plus a concurrent-stream cap, both keyed per identifier
//! and backed by an in-process fast counter store. A networked backend
//! (Redis et al.) could implement the same shape without touching call
//! sites — the seam the teacher uses for its swappable `MlClient`.

use cortex_common::clock::Clock;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Sustained requests per second.
    pub requests_per_second: f64,
    /// Burst capacity on top of the sustained rate.
    pub burst: f64,
    /// Max concurrent in-flight streaming requests per identifier.
    pub max_concurrent_streams: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst: 20.0,
            max_concurrent_streams: 4,
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: chrono::DateTime<chrono::Utc>,
}

pub struct RateLimitStore {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    buckets: DashMap<String, Mutex<Bucket>>,
    concurrency: DashMap<String, Arc<AtomicU32>>,
}

impl RateLimitStore {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            buckets: DashMap::new(),
            concurrency: DashMap::new(),
        }
    }

    /// Sliding-window RPS check (spec.md §4.5, property #8): a classic
    /// token bucket with capacity `burst` and refill rate
    /// `requests_per_second` provides the same "at most K·T+B in any
    /// T-second window" guarantee as a sliding log, atomically per
    /// identifier.
    pub fn allow(&self, identifier: &str) -> bool {
        let now = self.clock.now();
        let entry = self
            .buckets
            .entry(identifier.to_string())
            .or_insert_with(|| {
                Mutex::new(Bucket {
                    tokens: self.config.burst,
                    last_refill: now,
                })
            });
        let mut bucket = entry.lock();

        let elapsed = (now - bucket.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        bucket.tokens = (bucket.tokens + elapsed * self.config.requests_per_second).min(self.config.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Acquires one concurrent-stream slot (spec.md §4.5): "streaming
    /// requests acquire a slot on request start and release on stream end
    /// (including client disconnect)". The returned guard's `Drop`
    /// performs the release, so a disconnect that drops the request future
    /// still frees the slot.
    pub fn acquire_stream_slot(&self, identifier: &str) -> Option<ConcurrencyGuard> {
        let counter = self
            .concurrency
            .entry(identifier.to_string())
            .or_insert_with(|| Arc::new(AtomicU32::new(0)))
            .clone();

        loop {
            let current = counter.load(Ordering::SeqCst);
            if current >= self.config.max_concurrent_streams {
                return None;
            }
            if counter
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Some(ConcurrencyGuard { counter });
            }
        }
    }

    pub fn in_flight(&self, identifier: &str) -> u32 {
        self.concurrency
            .get(identifier)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

/// Releases its concurrency slot when dropped — covers both the normal
/// stream-end path and a client disconnect that drops the request future.
pub struct ConcurrencyGuard {
    counter: Arc<AtomicU32>,
}

impl Drop for ConcurrencyGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_common::clock::FakeClock;

    fn store(config: RateLimitConfig) -> (Arc<FakeClock>, RateLimitStore) {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let store = RateLimitStore::new(config, clock.clone());
        (clock, store)
    }

    #[test]
    fn at_most_burst_requests_succeed_instantaneously() {
        let (_, store) = store(RateLimitConfig {
            requests_per_second: 1.0,
            burst: 5.0,
            max_concurrent_streams: 1,
        });
        let mut allowed = 0;
        for _ in 0..10 {
            if store.allow("k1") {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }

    #[test]
    fn tokens_refill_over_time() {
        let (clock, store) = store(RateLimitConfig {
            requests_per_second: 10.0,
            burst: 1.0,
            max_concurrent_streams: 1,
        });
        assert!(store.allow("k1"));
        assert!(!store.allow("k1"));
        clock.advance(std::time::Duration::from_millis(200));
        assert!(store.allow("k1"));
    }

    #[test]
    fn identifiers_have_independent_buckets() {
        let (_, store) = store(RateLimitConfig {
            requests_per_second: 1.0,
            burst: 1.0,
            max_concurrent_streams: 1,
        });
        assert!(store.allow("k1"));
        assert!(store.allow("k2"));
    }

    #[test]
    fn concurrency_cap_is_enforced_and_released_on_drop() {
        let (_, store) = store(RateLimitConfig {
            requests_per_second: 100.0,
            burst: 100.0,
            max_concurrent_streams: 2,
        });
        let g1 = store.acquire_stream_slot("k1").unwrap();
        let g2 = store.acquire_stream_slot("k1").unwrap();
        assert!(store.acquire_stream_slot("k1").is_none());
        drop(g1);
        assert!(store.acquire_stream_slot("k1").is_some());
        drop(g2);
    }
}
