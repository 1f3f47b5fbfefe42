//! # netem-policy
//!
//! The sample impairment policy: a stateless loss/duplication/jitter
//! model. An external collaborator of `netem-core` — it implements
//! `ImpairmentPolicy` but has no special standing with the reactor beyond
//! any other implementation.
//!
//! Parameters are stored as bit-cast `f64` in `AtomicU64` cells so they
//! can be mutated from any thread while the reactor reads them on every
//! `compute` call, without a lock on the hot path. Reads of different
//! parameters within one `compute` call are not mutually consistent —
//! `delay` and `jitter` may momentarily desynchronize under concurrent
//! writes — which the design accepts as harmless for a best-effort
//! emulator (see spec.md §5).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::Rng;
use rand::RngExt;
use rand::SeedableRng;

use netem_core::{ImpairmentPolicy, Scheduled};

/// Default parameters (spec.md §6).
pub const DEFAULT_LOSS: f64 = 0.10;
pub const DEFAULT_DUPLICATION: f64 = 0.03;
pub const DEFAULT_DELAY_MS: u64 = 175;
pub const DEFAULT_JITTER_MS: u64 = 75;

#[derive(Debug, Clone, Copy)]
pub struct PolicyParams {
    /// Probability in `[0, 1]` that a given copy is dropped.
    pub loss: f64,
    /// Probability in `[0, 1)` of emitting one more copy after this one.
    /// A value >= 1.0 makes the policy loop forever — a caller error the
    /// policy does not attempt to detect (spec.md §4.D, §9).
    pub duplication: f64,
    /// Base delay applied to every surviving copy.
    pub delay_ms: u64,
    /// Half-width of the uniform jitter window around `delay_ms`.
    pub jitter_ms: u64,
}

impl Default for PolicyParams {
    fn default() -> Self {
        PolicyParams {
            loss: DEFAULT_LOSS,
            duplication: DEFAULT_DUPLICATION,
            delay_ms: DEFAULT_DELAY_MS,
            jitter_ms: DEFAULT_JITTER_MS,
        }
    }
}

/// The reference policy: on each ingress datagram, runs a do-while loop —
/// with probability `1 - loss` the current copy survives and is scheduled
/// at `now + delay +/- jitter`; the loop then continues with probability
/// `duplication`. This yields geometric duplication counts and uniform
/// jitter within `delay +/- jitter`.
pub struct ReferencePolicy {
    loss: AtomicU64,
    duplication: AtomicU64,
    delay_ms: AtomicU64,
    jitter_ms: AtomicU64,
    rng: Mutex<StdRng>,
}

impl ReferencePolicy {
    pub fn new(params: PolicyParams) -> Self {
        ReferencePolicy {
            loss: AtomicU64::new(params.loss.to_bits()),
            duplication: AtomicU64::new(params.duplication.to_bits()),
            delay_ms: AtomicU64::new(params.delay_ms),
            jitter_ms: AtomicU64::new(params.jitter_ms),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Same as [`ReferencePolicy::new`] but with a fixed seed, for
    /// reproducible tests and scripted demos.
    pub fn seeded(params: PolicyParams, seed: u64) -> Self {
        ReferencePolicy {
            loss: AtomicU64::new(params.loss.to_bits()),
            duplication: AtomicU64::new(params.duplication.to_bits()),
            delay_ms: AtomicU64::new(params.delay_ms),
            jitter_ms: AtomicU64::new(params.jitter_ms),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn loss(&self) -> f64 {
        f64::from_bits(self.loss.load(Ordering::Relaxed))
    }

    pub fn set_loss(&self, loss: f64) {
        self.loss.store(loss.to_bits(), Ordering::Relaxed);
    }

    pub fn duplication(&self) -> f64 {
        f64::from_bits(self.duplication.load(Ordering::Relaxed))
    }

    pub fn set_duplication(&self, duplication: f64) {
        self.duplication.store(duplication.to_bits(), Ordering::Relaxed);
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms.load(Ordering::Relaxed)
    }

    pub fn set_delay_ms(&self, delay_ms: u64) {
        self.delay_ms.store(delay_ms, Ordering::Relaxed);
    }

    pub fn jitter_ms(&self) -> u64 {
        self.jitter_ms.load(Ordering::Relaxed)
    }

    pub fn set_jitter_ms(&self, jitter_ms: u64) {
        self.jitter_ms.store(jitter_ms, Ordering::Relaxed);
    }
}

impl Default for ReferencePolicy {
    fn default() -> Self {
        ReferencePolicy::new(PolicyParams::default())
    }
}

impl ImpairmentPolicy for ReferencePolicy {
    fn compute(&self, now_ms: u64, _pending: &[&Scheduled], out_deadlines: &mut Vec<u64>) {
        let loss = self.loss();
        let duplication = self.duplication();
        let delay_ms = self.delay_ms() as f64;
        let jitter_ms = self.jitter_ms() as f64;

        let mut rng = self.rng.lock().unwrap();
        loop {
            if rng.random::<f64>() >= loss {
                let offset = if jitter_ms > 0.0 {
                    rng.random::<f64>() * 2.0 * jitter_ms - jitter_ms
                } else {
                    0.0
                };
                let deadline = (now_ms as f64 + delay_ms + offset).max(now_ms as f64) as u64;
                out_deadlines.push(deadline);
            }
            if rng.random::<f64>() >= duplication {
                break;
            }
        }
    }
}
