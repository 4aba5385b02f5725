//! Consecutive-failure circuit breaker.
//!
//! Open/closed is recomputed from the failure count and stamp on every
//! check; there is no timer-driven transition. Once the cooldown since the
//! last failure has elapsed, the next check resets the count and lets work
//! through again.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::metrics::{record_breaker_rejection, record_breaker_trip};

/// Circuit breaker states, for monitoring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Work is admitted.
    Closed,
    /// Work is rejected until the cooldown elapses.
    Open { retry_in: Duration },
}

/// Snapshot of breaker counters.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub consecutive_failures: u32,
    pub threshold: u32,
    pub cooldown_ms: u64,
    pub total_breaks: u64,
    pub open: bool,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    total_breaks: u64,
}

#[derive(Clone, Debug)]
pub struct CircuitBreaker {
    state: Arc<Mutex<BreakerState>>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(BreakerState::default())),
            threshold: threshold.max(1),
            cooldown,
        }
    }

    /// Check if a new attempt may start.
    pub fn can_proceed(&self) -> bool {
        let mut state = self.state.lock();
        if state.consecutive_failures < self.threshold {
            return true;
        }

        let since_failure = state
            .last_failure
            .map(|t| t.elapsed())
            .unwrap_or(Duration::MAX);
        if since_failure > self.cooldown {
            info!(
                failures = state.consecutive_failures,
                "Circuit breaker cooldown elapsed, resetting"
            );
            state.consecutive_failures = 0;
            return true;
        }

        record_breaker_rejection();
        false
    }

    /// Record a failed job.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure = Some(Instant::now());

        if state.consecutive_failures == self.threshold {
            state.total_breaks += 1;
            record_breaker_trip();
            warn!(
                failures = state.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "Circuit breaker opened"
            );
        }
    }

    /// Record a successful job. Always resets the failure count.
    pub fn record_success(&self) {
        self.state.lock().consecutive_failures = 0;
    }

    /// Get current state for monitoring. Does not reset an expired breaker.
    pub fn state(&self) -> CircuitState {
        let state = self.state.lock();
        if state.consecutive_failures < self.threshold {
            return CircuitState::Closed;
        }
        let since_failure = state
            .last_failure
            .map(|t| t.elapsed())
            .unwrap_or(Duration::MAX);
        if since_failure > self.cooldown {
            CircuitState::Closed
        } else {
            CircuitState::Open {
                retry_in: self.cooldown - since_failure,
            }
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    pub fn total_breaks(&self) -> u64 {
        self.state.lock().total_breaks
    }

    pub fn stats(&self) -> BreakerStats {
        let open = matches!(self.state(), CircuitState::Open { .. });
        let state = self.state.lock();
        BreakerStats {
            consecutive_failures: state.consecutive_failures,
            threshold: self.threshold,
            cooldown_ms: self.cooldown.as_millis() as u64,
            total_breaks: state.total_breaks,
            open,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.can_proceed());

        breaker.record_failure();
        assert!(!breaker.can_proceed());
        assert_eq!(breaker.total_breaks(), 1);
        assert!(matches!(breaker.state(), CircuitState::Open { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_open_through_cooldown_then_resets() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!breaker.can_proceed());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(breaker.can_proceed());
        assert_eq!(breaker.consecutive_failures(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.can_proceed());
        assert_eq!(breaker.total_breaks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trip_counted_once_per_crossing() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert_eq!(breaker.total_breaks(), 1);

        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.total_breaks(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_while_open_extends_cooldown() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(8)).await;
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(!breaker.can_proceed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_reports_open() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        breaker.record_failure();
        let stats = breaker.stats();
        assert!(stats.open);
        assert_eq!(stats.consecutive_failures, 1);
        assert_eq!(stats.cooldown_ms, 10_000);
    }
}
