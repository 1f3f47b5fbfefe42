use std::cmp::Ordering;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::{Buffer, Endpoint};

/// A mutable integer shared by every [`Scheduled`] entry derived from a
/// single ingress datagram. Created at 0, incremented once per emitted
/// deadline, decremented after each successful send. The buffer backing
/// the group is returned to the pool exactly when the counter reaches
/// zero after having been incremented at least once.
#[derive(Debug, Default)]
pub struct DuplicateCounter(AtomicU32);

impl DuplicateCounter {
    pub fn new() -> Self {
        DuplicateCounter(AtomicU32::new(0))
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, AtomicOrdering::AcqRel);
    }

    /// Decrements the counter and returns the value it held *before* the
    /// decrement — a return of `1` means this call just brought it to zero.
    pub fn decrement(&self) -> u32 {
        self.0.fetch_sub(1, AtomicOrdering::AcqRel)
    }

    pub fn get(&self) -> u32 {
        self.0.load(AtomicOrdering::Acquire)
    }
}

/// A queued future send: a payload reference, destination, deadline, and
/// the shared duplicate counter of its ingress group.
///
/// Totally ordered by `deadline_ms` ascending; ties are broken arbitrarily
/// but stably within a single reactor iteration, since the queue never
/// reorders entries with equal keys relative to insertion order.
#[derive(Debug, Clone)]
pub struct Scheduled {
    pub buffer: Arc<Buffer>,
    pub destination: Endpoint,
    pub deadline_ms: u64,
    pub counter: Arc<DuplicateCounter>,
}

impl Scheduled {
    pub fn deadline(&self) -> u64 {
        self.deadline_ms
    }

    pub fn is_ready(&self, now_ms: u64) -> bool {
        self.deadline_ms <= now_ms
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deadline_ms == other.deadline_ms
            && self.destination == other.destination
            && Arc::ptr_eq(&self.buffer, &other.buffer)
            && Arc::ptr_eq(&self.counter, &other.counter)
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline_ms.cmp(&other.deadline_ms)
    }
}
