//! Bounded-parallelism gate for in-flight jobs.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use crate::gate::{Gate, GatePermit};
use crate::metrics::record_gate_active;

/// Snapshot of gate counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConcurrencyStats {
    pub limit: usize,
    pub active: usize,
    pub queued: usize,
    pub completed: u64,
}

/// At most `limit` tasks run at once. Waiters are served first-in, first-out,
/// and a slot is always returned when the task finishes or fails.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    name: String,
    limit: usize,
    gate: Arc<Gate>,
}

/// A held slot; released on drop.
#[derive(Debug)]
pub struct ConcurrencySlot {
    permit: GatePermit,
}

impl ConcurrencySlot {
    /// Release early. Dropping afterwards is a no-op.
    pub fn release(&self) {
        self.permit.release();
    }
}

impl ConcurrencyLimiter {
    pub fn new(name: impl Into<String>, limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            name: name.into(),
            limit,
            gate: Gate::new(limit),
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> ConcurrencySlot {
        let permit = self.gate.acquire().await;
        record_gate_active(&self.name, self.gate.snapshot().active);
        ConcurrencySlot { permit }
    }

    /// Run `task` inside a slot.
    pub async fn run<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let slot = self.acquire().await;
        let output = task.await;
        drop(slot);
        record_gate_active(&self.name, self.gate.snapshot().active);
        output
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn active(&self) -> usize {
        self.gate.snapshot().active
    }

    pub fn queue_depth(&self) -> usize {
        self.gate.snapshot().queued
    }

    pub fn completed(&self) -> u64 {
        self.gate.snapshot().completed
    }

    pub fn stats(&self) -> ConcurrencyStats {
        let snap = self.gate.snapshot();
        ConcurrencyStats {
            limit: snap.limit,
            active: snap.active,
            queued: snap.queued,
            completed: snap.completed,
        }
    }
}
