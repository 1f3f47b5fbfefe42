//! The process-global reactor (component F): a single worker thread that
//! drives every registered [`crate::EmulatorInstance`].

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use mio::{Events, Poll, Token};
use slab::Slab;

use crate::clock::Clock;
use crate::instance::InstanceShared;
use crate::lifecycle::WAKER_TOKEN;

const EVENTS_CAPACITY: usize = 128;

/// The reactor's main loop. Runs until `shutdown` is observed set, which
/// happens only after the last live instance has deregistered.
///
/// Two structural errors are treated as benign races — a selection key
/// cancelled, or a channel closed, by another thread mid-iteration — and
/// are swallowed at the point they occur (inside `InstanceShared`'s
/// ingress/egress and interest-management methods). Any other I/O error
/// surfacing from `Poll::poll` itself is fatal: it is logged and the
/// reactor loop exits, leaving any remaining instances non-functional
/// until they are explicitly stopped.
pub(crate) fn run(
    mut poll: Poll,
    instances: Arc<Mutex<Slab<Arc<InstanceShared>>>>,
    shutdown: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
) {
    let registry = match poll.registry().try_clone() {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "failed to clone reactor registry, reactor cannot start");
            return;
        }
    };
    let mut events = Events::with_capacity(EVENTS_CAPACITY);

    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        // Sample the clock once per iteration; this value is authoritative
        // for every per-instance step taken in this tick.
        let now = clock.now_ms();

        {
            let map = instances.lock().unwrap();
            for (key, inst) in map.iter() {
                if inst.has_due_head(now) {
                    inst.set_write_interest(&registry, Token(key));
                }
            }
        }

        match poll.poll(&mut events, Some(Duration::from_millis(0))) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::error!(error = %e, "reactor poll failed fatally, exiting reactor loop");
                break;
            }
        }

        if events.is_empty() {
            thread::yield_now();
            continue;
        }

        for event in events.iter() {
            let token = event.token();
            if token == WAKER_TOKEN {
                continue;
            }

            let inst = {
                let map = instances.lock().unwrap();
                map.get(token.0).cloned()
            };
            let Some(inst) = inst else {
                // Benign: the instance was unregistered between poll and lookup.
                continue;
            };

            if event.is_readable() {
                inst.drain_ingress(now);
            }
            if event.is_writable() {
                inst.drain_egress(now);
                inst.clear_write_interest(&registry, token);
            }
        }
    }

    tracing::info!("reactor loop exited");
}
