//! Test doubles shared by this crate's own unit tests and usable by
//! downstream crates under `#[cfg(test)]` (the `netem-policy` and
//! `netem-demo` test suites mirror these).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::{Buffer, Clock, ImpairmentPolicy, Scheduled};

/// A clock driven entirely by test code, making deadline comparisons
/// deterministic without sleeping real time.
#[derive(Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        ManualClock(AtomicU64::new(start_ms))
    }

    pub fn advance(&self, delta_ms: u64) {
        self.0.fetch_add(delta_ms, Ordering::Relaxed);
    }

    pub fn set(&self, ms: u64) {
        self.0.store(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A policy that replays a fixed, pre-programmed sequence of deadline
/// lists, one per call to `compute`, regardless of `now_ms` or the
/// pending view. Exhausted calls emit an empty list (drop).
pub struct ScriptedPolicy {
    script: Mutex<std::collections::VecDeque<Vec<u64>>>,
}

impl ScriptedPolicy {
    pub fn new(script: Vec<Vec<u64>>) -> Self {
        ScriptedPolicy {
            script: Mutex::new(script.into_iter().collect()),
        }
    }
}

impl ImpairmentPolicy for ScriptedPolicy {
    fn compute(&self, _now_ms: u64, _pending: &[&Scheduled], out_deadlines: &mut Vec<u64>) {
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            out_deadlines.extend(next);
        }
    }
}

/// A buffer of the given capacity, empty, not owned by any pool — for
/// tests that only need a payload to attach to a `Scheduled` entry.
pub fn dummy_buffer(capacity: usize) -> Buffer {
    Buffer::new(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_on_demand() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_ms(), 100);
        clock.advance(50);
        assert_eq!(clock.now_ms(), 150);
    }

    #[test]
    fn scripted_policy_replays_in_order() {
        let policy = ScriptedPolicy::new(vec![vec![10, 20], vec![], vec![30]]);
        let mut out = Vec::new();
        policy.compute(0, &[], &mut out);
        assert_eq!(out, vec![10, 20]);

        out.clear();
        policy.compute(0, &[], &mut out);
        assert!(out.is_empty());

        out.clear();
        policy.compute(0, &[], &mut out);
        assert_eq!(out, vec![30]);
    }
}
