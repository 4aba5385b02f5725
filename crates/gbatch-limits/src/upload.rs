//! Adaptive gate for bandwidth-bound transfers.
//!
//! Behaves like [`ConcurrencyLimiter`](crate::ConcurrencyLimiter) but its
//! ceiling moves with observed latency:
//!
//! - timeout = `base` until 3 samples exist, then
//!   `max(base, min(2 × avg(last 5), max_timeout))`
//! - avg(last 3) > `slow_threshold` while fast → limit drops to
//!   `fallback_concurrency`, slow mode on
//! - avg(last 3) < `recovery_threshold` while slow → limit becomes
//!   `fallback_concurrency + 1`, slow mode off
//!
//! The gap between the two thresholds keeps one noisy sample from toggling
//! the mode back and forth.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::gate::{Gate, GatePermit};
use crate::metrics::{record_gate_active, record_upload, record_upload_limit_change};

/// Samples kept in the latency history.
pub const HISTORY_LEN: usize = 10;
/// Samples required before the timeout adapts.
const MIN_SAMPLES_FOR_TIMEOUT: usize = 3;
/// Samples averaged for the timeout.
const TIMEOUT_WINDOW: usize = 5;
/// Samples averaged for slow-mode decisions.
const MODE_WINDOW: usize = 3;

/// Upload limiter configuration.
#[derive(Debug, Clone)]
pub struct UploadLimiterConfig {
    /// Initial concurrency ceiling.
    pub concurrency: usize,
    /// Ceiling while slow mode is active.
    pub fallback_concurrency: usize,
    /// Timeout used until enough samples exist, and the adaptive floor.
    pub base_timeout: Duration,
    /// Cap on the adaptive timeout.
    pub max_timeout: Duration,
    /// Enter slow mode above this average.
    pub slow_threshold: Duration,
    /// Leave slow mode below this average.
    pub recovery_threshold: Duration,
}

impl Default for UploadLimiterConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            fallback_concurrency: 2,
            base_timeout: Duration::from_secs(30),
            max_timeout: Duration::from_secs(60),
            slow_threshold: Duration::from_secs(20),
            recovery_threshold: Duration::from_secs(15),
        }
    }
}

/// Failure of a wrapped call.
#[derive(Debug, Error)]
pub enum UploadCallError<E> {
    #[error("Upload timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Failed(E),
}

/// Snapshot of limiter counters.
#[derive(Debug, Clone, Serialize)]
pub struct UploadStats {
    pub limit: usize,
    pub in_flight: usize,
    pub queued: usize,
    pub completed: u64,
    pub average_duration_ms: u64,
    pub current_timeout_ms: u64,
    pub slow_connection_detected: bool,
}

#[derive(Debug, Default)]
struct LatencyHistory {
    samples: VecDeque<Duration>,
    slow: bool,
}

impl LatencyHistory {
    fn push(&mut self, sample: Duration) {
        if self.samples.len() == HISTORY_LEN {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Average of the newest `n` samples.
    fn average_last(&self, n: usize) -> Option<Duration> {
        let count = self.samples.len().min(n);
        if count == 0 {
            return None;
        }
        let total: Duration = self.samples.iter().rev().take(count).sum();
        Some(total / count as u32)
    }
}

/// A held upload slot. Released exactly once.
#[derive(Debug)]
pub struct UploadSlot {
    permit: GatePermit,
    gate: Arc<Gate>,
}

impl UploadSlot {
    /// Release the slot. Later calls and the eventual drop are no-ops.
    pub fn release(&self) -> bool {
        let released = self.permit.release();
        if released {
            record_gate_active("upload", self.gate.snapshot().active);
        }
        released
    }
}

/// Concurrency gate for uploads with adaptive timeout and ceiling.
#[derive(Debug, Clone)]
pub struct UploadLimiter {
    config: UploadLimiterConfig,
    gate: Arc<Gate>,
    history: Arc<Mutex<LatencyHistory>>,
}

impl UploadLimiter {
    pub fn new(config: UploadLimiterConfig) -> Self {
        let gate = Gate::new(config.concurrency);
        Self {
            config,
            gate,
            history: Arc::new(Mutex::new(LatencyHistory::default())),
        }
    }

    pub async fn acquire_slot(&self) -> UploadSlot {
        let permit = self.gate.acquire().await;
        record_gate_active("upload", self.gate.snapshot().active);
        UploadSlot {
            permit,
            gate: Arc::clone(&self.gate),
        }
    }

    pub fn release_slot(&self, slot: &UploadSlot) -> bool {
        slot.release()
    }

    /// Timeout for the next call.
    pub fn current_timeout(&self) -> Duration {
        let history = self.history.lock();
        self.timeout_for(&history)
    }

    fn timeout_for(&self, history: &LatencyHistory) -> Duration {
        if history.samples.len() < MIN_SAMPLES_FOR_TIMEOUT {
            return self.config.base_timeout;
        }
        let avg = history
            .average_last(TIMEOUT_WINDOW)
            .unwrap_or(self.config.base_timeout);
        self.config
            .base_timeout
            .max((avg * 2).min(self.config.max_timeout))
    }

    /// Run `call` inside an upload slot under the adaptive timeout.
    ///
    /// The slot is released once on every path: success, error, timeout, or
    /// cancellation of the returned future.
    pub async fn wrap_call<F, Fut, T, E>(&self, call: F) -> Result<T, UploadCallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let slot = self.acquire_slot().await;
        let timeout = self.current_timeout();
        let started = Instant::now();

        let result = tokio::time::timeout(timeout, call()).await;
        let elapsed = started.elapsed().min(timeout);
        slot.release();

        let (outcome, result) = match result {
            Ok(Ok(value)) => ("ok", Ok(value)),
            Ok(Err(e)) => ("error", Err(UploadCallError::Failed(e))),
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Upload timed out");
                ("timeout", Err(UploadCallError::TimedOut(timeout)))
            }
        };
        record_upload(elapsed, outcome);
        self.record_duration(elapsed);
        result
    }

    /// Record a transfer duration and re-evaluate slow mode.
    pub fn record_duration(&self, duration: Duration) {
        let mut history = self.history.lock();
        history.push(duration);

        if history.samples.len() < MODE_WINDOW {
            return;
        }
        let Some(recent) = history.average_last(MODE_WINDOW) else {
            return;
        };

        if !history.slow && recent > self.config.slow_threshold {
            history.slow = true;
            self.gate.set_limit(self.config.fallback_concurrency);
            record_upload_limit_change("downgrade");
            warn!(
                average_ms = recent.as_millis() as u64,
                limit = self.config.fallback_concurrency,
                "Slow uploads detected, reducing upload concurrency"
            );
        } else if history.slow && recent < self.config.recovery_threshold {
            history.slow = false;
            let restored = self.config.fallback_concurrency + 1;
            self.gate.set_limit(restored);
            record_upload_limit_change("upgrade");
            info!(
                average_ms = recent.as_millis() as u64,
                limit = restored,
                "Upload latency recovered, restoring upload concurrency"
            );
        } else {
            debug!(average_ms = recent.as_millis() as u64, "Upload latency sample");
        }
    }

    pub fn is_slow(&self) -> bool {
        self.history.lock().slow
    }

    pub fn limit(&self) -> usize {
        self.gate.snapshot().limit
    }

    pub fn stats(&self) -> UploadStats {
        let snap = self.gate.snapshot();
        let history = self.history.lock();
        let average = history
            .average_last(HISTORY_LEN)
            .unwrap_or(Duration::ZERO);
        UploadStats {
            limit: snap.limit,
            in_flight: snap.active,
            queued: snap.queued,
            completed: snap.completed,
            average_duration_ms: average.as_millis() as u64,
            current_timeout_ms: self.timeout_for(&history).as_millis() as u64,
            slow_connection_detected: history.slow,
        }
    }
}

impl Default for UploadLimiter {
    fn default() -> Self {
        Self::new(UploadLimiterConfig::default())
    }
}
