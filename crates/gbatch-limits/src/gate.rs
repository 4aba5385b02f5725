//! FIFO counting gate shared by the concurrency and upload limiters.
//!
//! Freed slots are handed directly to the oldest waiter, so a newcomer can
//! never overtake a queued acquirer. The limit may change at runtime; when
//! it shrinks, holders above the new limit keep their slots and the gate
//! simply stops granting until `active` drops below `limit`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

#[derive(Debug)]
struct GateState {
    limit: usize,
    active: usize,
    completed: u64,
    next_ticket: u64,
    waiters: VecDeque<(u64, oneshot::Sender<()>)>,
}

impl GateState {
    /// Grant slots to queued waiters while capacity remains.
    fn dispatch(&mut self) {
        while self.active < self.limit {
            let Some((_, tx)) = self.waiters.pop_front() else {
                break;
            };
            // A closed receiver belongs to a cancelled acquirer; skip it.
            if tx.send(()).is_ok() {
                self.active += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GateSnapshot {
    pub limit: usize,
    pub active: usize,
    pub queued: usize,
    pub completed: u64,
}

#[derive(Debug)]
pub(crate) struct Gate {
    state: Mutex<GateState>,
}

enum Entry {
    Granted,
    Queued(u64, oneshot::Receiver<()>),
}

impl Gate {
    pub(crate) fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GateState {
                limit: limit.max(1),
                active: 0,
                completed: 0,
                next_ticket: 0,
                waiters: VecDeque::new(),
            }),
        })
    }

    fn enter(&self) -> Entry {
        let mut state = self.state.lock();
        if state.active < state.limit && state.waiters.is_empty() {
            state.active += 1;
            return Entry::Granted;
        }
        let (tx, rx) = oneshot::channel();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiters.push_back((ticket, tx));
        Entry::Queued(ticket, rx)
    }

    /// Wait for a slot. Cancelling the returned future never leaks a slot.
    pub(crate) async fn acquire(self: &Arc<Self>) -> GatePermit {
        loop {
            let (ticket, rx) = match self.enter() {
                Entry::Granted => return GatePermit::new(Arc::clone(self)),
                Entry::Queued(ticket, rx) => (ticket, rx),
            };

            let mut waiter = Waiter {
                gate: Arc::clone(self),
                ticket,
                rx,
                settled: false,
            };

            let granted = (&mut waiter.rx).await.is_ok();
            waiter.settled = true;
            if granted {
                return GatePermit::new(Arc::clone(self));
            }
        }
    }

    pub(crate) fn set_limit(&self, limit: usize) {
        let mut state = self.state.lock();
        state.limit = limit.max(1);
        state.dispatch();
    }

    pub(crate) fn snapshot(&self) -> GateSnapshot {
        let state = self.state.lock();
        GateSnapshot {
            limit: state.limit,
            active: state.active,
            queued: state.waiters.len(),
            completed: state.completed,
        }
    }

    fn release(&self, completed: bool) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        if completed {
            state.completed += 1;
        }
        state.dispatch();
    }

    fn forget_waiter(&self, ticket: u64) {
        let mut state = self.state.lock();
        state.waiters.retain(|(t, _)| *t != ticket);
    }
}

/// Pending acquisition. Dropping it unsettled cleans up the queue entry or
/// hands back a slot that was granted after cancellation.
struct Waiter {
    gate: Arc<Gate>,
    ticket: u64,
    rx: oneshot::Receiver<()>,
    settled: bool,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            self.gate.release(false);
        } else {
            self.gate.forget_waiter(self.ticket);
        }
    }
}

/// A held slot. Released exactly once, either explicitly or on drop.
#[derive(Debug)]
pub(crate) struct GatePermit {
    gate: Arc<Gate>,
    released: AtomicBool,
}

impl GatePermit {
    fn new(gate: Arc<Gate>) -> Self {
        Self {
            gate,
            released: AtomicBool::new(false),
        }
    }

    /// Release the slot. Returns false if it was already released.
    pub(crate) fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.gate.release(true);
        true
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.release();
    }
}
