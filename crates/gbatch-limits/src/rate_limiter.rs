//! Token-bucket rate limiter.
//!
//! Bounds calls per minute to a single quota-constrained dependency.
//! `acquire` never rejects; it only delays.
//!
//! Refill is coarse: tokens are credited on every call from the elapsed
//! time since the last refill stamp, but the stamp only advances once at
//! least [`REFILL_GRANULARITY`] has passed. Under sustained contention the
//! single-token wait formula can under- or over-shoot slightly; this limiter
//! guards a low-volume dependency, not the hot path.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::metrics::record_rate_acquire;

/// Minimum elapsed time before the refill stamp advances.
pub const REFILL_GRANULARITY: Duration = Duration::from_millis(1000);

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    total_requests: u64,
    total_wait: Duration,
}

impl BucketState {
    fn refill(&mut self, capacity: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let added = elapsed.as_secs_f64() / 60.0 * capacity;
        self.tokens = (self.tokens + added).min(capacity);
        if elapsed >= REFILL_GRANULARITY {
            self.last_refill = now;
        }
    }
}

/// Snapshot of limiter counters.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub capacity_per_minute: u32,
    pub tokens: f64,
    pub total_requests: u64,
    pub total_wait_ms: u64,
    pub average_wait_ms: f64,
}

/// Token bucket with `capacity` requests per minute.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    name: String,
    capacity: u32,
    state: Arc<Mutex<BucketState>>,
}

impl RateLimiter {
    /// Create a full bucket. A capacity of zero is treated as one.
    pub fn new(name: impl Into<String>, requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute.max(1);
        Self {
            name: name.into(),
            capacity,
            state: Arc::new(Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
                total_requests: 0,
                total_wait: Duration::ZERO,
            })),
        }
    }

    /// Wait until a token is available, then consume it.
    pub async fn acquire(&self) {
        let capacity = self.capacity as f64;

        let wait = {
            let mut state = self.state.lock();
            state.refill(capacity, Instant::now());
            state.total_requests += 1;
            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                None
            } else {
                Some(Duration::from_secs_f64(
                    (1.0 - state.tokens) * 60.0 / capacity,
                ))
            }
        };

        if let Some(wait) = wait {
            debug!(
                limiter = %self.name,
                wait_ms = wait.as_millis() as u64,
                "Rate limit reached, waiting for token"
            );
            tokio::time::sleep(wait).await;

            let mut state = self.state.lock();
            state.tokens = 0.0;
            state.total_wait += wait;
        }

        record_rate_acquire(&self.name, wait);
    }

    pub fn stats(&self) -> RateLimiterStats {
        let state = self.state.lock();
        let total_wait_ms = state.total_wait.as_millis() as u64;
        let average_wait_ms = if state.total_requests == 0 {
            0.0
        } else {
            total_wait_ms as f64 / state.total_requests as f64
        };
        RateLimiterStats {
            capacity_per_minute: self.capacity,
            tokens: state.tokens,
            total_requests: state.total_requests,
            total_wait_ms,
            average_wait_ms,
        }
    }
}
