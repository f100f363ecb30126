//! Circuit breaker (spec.md §4.4, Glossary, testable property #7).
//!
//! Unit-testable with an injected `Clock` (spec.md §9's "tests inject a
//! fake clock" note) instead of real sleeps.

use chrono::Duration as ChronoDuration;
use cortex_common::clock::Clock;
use cortex_values::model::{CircuitBreakerState, CircuitState};
use dashmap::DashMap;
use std::sync::Arc;

/// The spec's open question resolved: consecutive-failure counting, not a
/// rolling window (spec.md §9). See DESIGN.md.
pub struct BreakerConfig {
    pub consecutive_failure_threshold: u32,
    pub cooldown: ChronoDuration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            consecutive_failure_threshold: 5,
            cooldown: ChronoDuration::seconds(30),
        }
    }
}

pub struct BreakerRegistry {
    states: DashMap<String, CircuitBreakerState>,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
}

/// What the caller should do for a request against this backend, decided
/// by consulting (and sometimes advancing) the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    /// Exactly one probe request is permitted (half-open state).
    AllowProbe,
    Reject,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: DashMap::new(),
            config,
            clock,
        }
    }

    fn entry(&self, base_url: &str) -> CircuitBreakerState {
        self.states
            .entry(base_url.to_string())
            .or_insert_with(|| CircuitBreakerState::new(base_url))
            .clone()
    }

    /// Step 3/4 of the selector algorithm (spec.md §4.4): decide whether
    /// this request may dial the backend.
    pub fn admit(&self, base_url: &str) -> Admission {
        let mut state = self.entry(base_url);
        match state.state {
            CircuitState::Closed => Admission::Allow,
            CircuitState::Open => {
                let now = self.clock.now();
                if state.cooldown_until.is_some_and(|deadline| now >= deadline) {
                    state.state = CircuitState::HalfOpen;
                    self.states.insert(base_url.to_string(), state);
                    Admission::AllowProbe
                } else {
                    Admission::Reject
                }
            }
            CircuitState::HalfOpen => Admission::Reject,
        }
    }

    /// Records a successful call; closes the breaker if it was half-open.
    pub fn record_success(&self, base_url: &str) {
        let mut state = self.entry(base_url);
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.opened_at = None;
        state.cooldown_until = None;
        self.states.insert(base_url.to_string(), state);
    }

    /// Records a failed call; opens the breaker once the consecutive
    /// threshold is reached, or re-opens immediately from half-open.
    pub fn record_failure(&self, base_url: &str) {
        let mut state = self.entry(base_url);
        let now = self.clock.now();
        match state.state {
            CircuitState::HalfOpen => {
                state.state = CircuitState::Open;
                state.opened_at = Some(now);
                state.cooldown_until = Some(now + self.config.cooldown);
            }
            CircuitState::Closed | CircuitState::Open => {
                state.failure_count += 1;
                if state.failure_count >= self.config.consecutive_failure_threshold {
                    state.state = CircuitState::Open;
                    state.opened_at = Some(now);
                    state.cooldown_until = Some(now + self.config.cooldown);
                }
            }
        }
        self.states.insert(base_url.to_string(), state);
    }

    pub fn snapshot(&self, base_url: &str) -> CircuitBreakerState {
        self.entry(base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_common::clock::FakeClock;

    fn registry(threshold: u32) -> (Arc<FakeClock>, BreakerRegistry) {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let config = BreakerConfig {
            consecutive_failure_threshold: threshold,
            cooldown: ChronoDuration::seconds(30),
        };
        let registry = BreakerRegistry::new(config, clock.clone());
        (clock, registry)
    }

    #[test]
    fn opens_after_consecutive_failure_threshold() {
        let (_, reg) = registry(5);
        for _ in 0..4 {
            reg.record_failure("http://b1");
            assert_eq!(reg.admit("http://b1"), Admission::Allow);
        }
        reg.record_failure("http://b1");
        assert_eq!(reg.admit("http://b1"), Admission::Reject);
    }

    #[test]
    fn cooldown_elapsing_permits_exactly_one_probe() {
        let (clock, reg) = registry(1);
        reg.record_failure("http://b1");
        assert_eq!(reg.admit("http://b1"), Admission::Reject);

        clock.advance(std::time::Duration::from_secs(31));
        assert_eq!(reg.admit("http://b1"), Admission::AllowProbe);
        // A second admit call before the probe resolves must not hand out
        // another probe slot.
        assert_eq!(reg.admit("http://b1"), Admission::Reject);
    }

    #[test]
    fn successful_probe_closes_the_breaker() {
        let (clock, reg) = registry(1);
        reg.record_failure("http://b1");
        clock.advance(std::time::Duration::from_secs(31));
        assert_eq!(reg.admit("http://b1"), Admission::AllowProbe);
        reg.record_success("http://b1");
        assert_eq!(reg.admit("http://b1"), Admission::Allow);
    }

    #[test]
    fn failed_probe_reopens_the_breaker() {
        let (clock, reg) = registry(1);
        reg.record_failure("http://b1");
        clock.advance(std::time::Duration::from_secs(31));
        assert_eq!(reg.admit("http://b1"), Admission::AllowProbe);
        reg.record_failure("http://b1");
        assert_eq!(reg.admit("http://b1"), Admission::Reject);
    }
}
