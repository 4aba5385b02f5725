//! Admission control for calls against quota- and bandwidth-constrained
//! providers.
//!
//! This crate provides:
//! - [`RateLimiter`]: token bucket bounding calls per minute
//! - [`ConcurrencyLimiter`]: fixed-size FIFO gate for in-flight jobs
//! - [`UploadLimiter`]: gate with adaptive timeout and latency-driven limit
//! - [`CircuitBreaker`]: consecutive-failure breaker with cooldown
//!
//! All state is owned by the instances themselves; build a fresh set per run.

pub mod circuit_breaker;
pub mod concurrency;
mod gate;
pub mod metrics;
pub mod rate_limiter;
pub mod upload;

pub use circuit_breaker::{BreakerStats, CircuitBreaker, CircuitState};
pub use concurrency::{ConcurrencyLimiter, ConcurrencySlot, ConcurrencyStats};
pub use rate_limiter::{RateLimiter, RateLimiterStats};
pub use upload::{UploadCallError, UploadLimiter, UploadLimiterConfig, UploadSlot, UploadStats};
