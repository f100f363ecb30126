//! Progressive two-phase startup verification (spec.md §4.2, testable
//! property #4).

use crate::container::ContainerDriver;
use cortex_common::clock::Clock;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    /// Exited within the quick-death window; caller should move the model
    /// to `failed` and capture logs.
    DiedQuickly,
    /// Survived the quick-death window and became ready within the
    /// readiness window; caller should move the model to `running`.
    Ready,
    /// Survived the quick-death window but never answered `/health` within
    /// the readiness window. Per spec.md §4.2 this does **not** fail the
    /// model — it stays `loading` and the out-of-band poller keeps trying.
    StillLoading,
}

pub struct StartupVerifier {
    driver: Arc<ContainerDriver>,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    quick_death_window: Duration,
    quick_death_interval: Duration,
    readiness_window: Duration,
    readiness_interval: Duration,
}

impl StartupVerifier {
    pub fn new(driver: Arc<ContainerDriver>, http: reqwest::Client, clock: Arc<dyn Clock>) -> Self {
        Self {
            driver,
            http,
            clock,
            quick_death_window: Duration::from_secs(5),
            quick_death_interval: Duration::from_millis(500),
            readiness_window: Duration::from_secs(12),
            readiness_interval: Duration::from_secs(2),
        }
    }

    pub fn with_readiness_window(mut self, window: Duration) -> Self {
        self.readiness_window = window;
        self
    }

    pub async fn verify(&self, container_name: &str, health_url: &str) -> StartupOutcome {
        let quick_death_deadline = self.clock.now() + chrono::Duration::from_std(self.quick_death_window).unwrap();
        while self.clock.now() < quick_death_deadline {
            match self.driver.has_exited(container_name).await {
                Ok(true) => return StartupOutcome::DiedQuickly,
                Ok(false) => {}
                Err(_) => {}
            }
            tokio::time::sleep(self.quick_death_interval).await;
        }

        let readiness_deadline = self.clock.now() + chrono::Duration::from_std(self.readiness_window).unwrap();
        while self.clock.now() < readiness_deadline {
            if let Ok(resp) = self.http.get(health_url).send().await {
                if resp.status().is_success() {
                    return StartupOutcome::Ready;
                }
            }
            if let Ok(true) = self.driver.has_exited(container_name).await {
                return StartupOutcome::DiedQuickly;
            }
            tokio::time::sleep(self.readiness_interval).await;
        }

        StartupOutcome::StillLoading
    }
}

#[cfg(test)]
mod tests {
    use super::StartupOutcome;

    #[test]
    fn outcomes_are_distinguishable() {
        assert_ne!(StartupOutcome::DiedQuickly, StartupOutcome::Ready);
        assert_ne!(StartupOutcome::Ready, StartupOutcome::StillLoading);
    }
}
