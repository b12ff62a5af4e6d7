use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::config::BreakerConfig;

/// Per-tier failure circuit, keyed by the tier's `adapter/model` binding.
/// A circuit is open while its binding has accumulated `failure_threshold`
/// failures inside the rolling window; failures age out on their own and a
/// success clears the binding entirely.
pub struct CircuitBreaker {
    config: BreakerConfig,
    failures: DashMap<String, Vec<DateTime<Utc>>>,
}

/// Point-in-time view of one tier binding's circuit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitState {
    pub binding: String,
    pub recent_failures: usize,
    pub open: bool,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            failures: DashMap::new(),
        }
    }

    pub fn record_failure(&self, binding: &str) {
        self.record_failure_at(binding, Utc::now());
    }

    pub fn record_failure_at(&self, binding: &str, now: DateTime<Utc>) {
        let mut entry = self.failures.entry(binding.to_string()).or_default();
        entry.push(now);
        let cutoff = now - Duration::seconds(self.config.window_secs as i64);
        entry.retain(|t| *t > cutoff);
    }

    pub fn record_success(&self, binding: &str) {
        self.failures.remove(binding);
    }

    pub fn is_open(&self, binding: &str) -> bool {
        self.is_open_at(binding, Utc::now())
    }

    pub fn is_open_at(&self, binding: &str, now: DateTime<Utc>) -> bool {
        self.recent_failures_at(binding, now) >= self.config.failure_threshold as usize
    }

    fn recent_failures_at(&self, binding: &str, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::seconds(self.config.window_secs as i64);
        self.failures
            .get(binding)
            .map(|entry| entry.iter().filter(|t| **t > cutoff).count())
            .unwrap_or(0)
    }

    /// States of every binding the breaker has seen fail, for health reporting
    pub fn snapshot(&self) -> Vec<CircuitState> {
        let now = Utc::now();
        let mut states: Vec<CircuitState> = self
            .failures
            .iter()
            .map(|entry| {
                let recent = self.recent_failures_at(entry.key(), now);
                CircuitState {
                    binding: entry.key().clone(),
                    recent_failures: recent,
                    open: recent >= self.config.failure_threshold as usize,
                }
            })
            .collect();
        states.sort_by(|a, b| a.binding.cmp(&b.binding));
        states
    }
}
