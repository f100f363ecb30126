//! The poller loop itself (spec.md §4.3, §5): one cooperative task per
//! process, probes run concurrently across backends and serialized per
//! backend, matching the fan-out-then-join style the teacher uses for its
//! own session bookkeeping (`appstate/src/orchestrator.rs`).

use crate::snapshots::SnapshotStore;
use cortex_registry::ModelRegistry;
use cortex_selector::BreakerRegistry;
use cortex_values::model::{ModelState, ProbeStatus};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub interval: Duration,
    pub probe_timeout: Duration,
    /// Consecutive probe failures on a `running` model before it is
    /// flagged (logged) — the poller never forcibly stops it, the
    /// controller alone owns `stop` (spec.md §4.3).
    pub flag_after_failures: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            flag_after_failures: 3,
        }
    }
}

pub struct HealthPoller {
    registry: Arc<ModelRegistry>,
    breaker: Arc<BreakerRegistry>,
    snapshots: Arc<SnapshotStore>,
    http: reqwest::Client,
    config: PollerConfig,
    /// One lock per backend URL so same-backend probes never overlap while
    /// distinct backends proceed concurrently (spec.md §4.3 ordering
    /// guarantee).
    per_backend_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl HealthPoller {
    pub fn new(
        registry: Arc<ModelRegistry>,
        breaker: Arc<BreakerRegistry>,
        snapshots: Arc<SnapshotStore>,
        http: reqwest::Client,
        config: PollerConfig,
    ) -> Self {
        Self {
            registry,
            breaker,
            snapshots,
            http,
            config,
            per_backend_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, base_url: &str) -> Arc<AsyncMutex<()>> {
        self.per_backend_locks
            .entry(base_url.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Runs until `shutdown` is cancelled; every probe aborts within one
    /// poll interval of shutdown, per spec.md §4.3's cancellation note.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("health poller shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }

    async fn poll_once(&self) {
        let models = match self.registry.list(&Default::default()) {
            Ok(models) => models,
            Err(err) => {
                tracing::warn!(error = %err, "health poller could not list models");
                return;
            }
        };

        let probes = models
            .into_iter()
            .filter(|m| matches!(m.state, ModelState::Starting | ModelState::Loading | ModelState::Running))
            .filter_map(|m| m.port.map(|port| (m.id, m.state, format!("http://127.0.0.1:{port}"))));

        let mut handles = Vec::new();
        for (model_id, state, base_url) in probes {
            let lock = self.lock_for(&base_url);
            let http = self.http.clone();
            let timeout = self.config.probe_timeout;
            handles.push(tokio::spawn(async move {
                let _guard = lock.lock().await;
                let started = std::time::Instant::now();
                let result = http
                    .get(format!("{base_url}/health"))
                    .timeout(timeout)
                    .send()
                    .await;
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                let status = match &result {
                    Ok(resp) if resp.status().is_success() => ProbeStatus::Healthy,
                    Ok(_) => ProbeStatus::Unhealthy,
                    Err(_) => ProbeStatus::Unknown,
                };
                (model_id, state, base_url, status, latency_ms)
            }));
        }

        let outcomes = futures::future::join_all(handles).await;
        for outcome in outcomes {
            let Ok((model_id, state, base_url, status, latency_ms)) = outcome else {
                continue;
            };
            self.snapshots.record_probe(&base_url, status, latency_ms, chrono::Utc::now());

            match status {
                ProbeStatus::Healthy => {
                    self.breaker.record_success(&base_url);
                    if state == ModelState::Loading {
                        if let Err(err) = self.registry.set_state(model_id, ModelState::Running, None).await {
                            tracing::warn!(model_id, error = %err, "poller could not transition model to running");
                        }
                    }
                }
                ProbeStatus::Unhealthy | ProbeStatus::Unknown => {
                    self.breaker.record_failure(&base_url);
                    if state == ModelState::Running {
                        let failures = self.snapshots.get(&base_url).consecutive_failures;
                        if failures >= self.config.flag_after_failures {
                            tracing::warn!(model_id, base_url, failures, "running model is failing health probes");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_common::clock::SystemClock;
    use cortex_registry::Store;
    use cortex_selector::breaker::BreakerConfig;

    fn poller() -> Arc<HealthPoller> {
        let registry = Arc::new(ModelRegistry::new(Arc::new(Store::open_temporary().unwrap())));
        let breaker = Arc::new(BreakerRegistry::new(BreakerConfig::default(), Arc::new(SystemClock)));
        let snapshots = Arc::new(SnapshotStore::new());
        Arc::new(HealthPoller::new(
            registry,
            breaker,
            snapshots,
            reqwest::Client::new(),
            PollerConfig {
                interval: Duration::from_millis(10),
                probe_timeout: Duration::from_millis(50),
                flag_after_failures: 2,
            },
        ))
    }

    #[tokio::test]
    async fn poll_once_on_empty_registry_is_a_no_op() {
        poller().poll_once().await;
    }

    #[tokio::test]
    async fn run_stops_promptly_on_cancellation() {
        let poller = poller();
        let token = CancellationToken::new();
        let token2 = token.clone();
        let handle = tokio::spawn(async move { poller.run(token2).await });
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller task should exit promptly after cancellation")
            .unwrap();
    }
}
