//! Process-global reactor lifecycle (component G).
//!
//! A single worker thread is shared by every live [`crate::EmulatorInstance`]
//! in the process. Its startup and teardown are guarded by one mutex around
//! an instance counter: the first `register` spawns the thread, the last
//! `unregister` joins it. The counter, the multiplexer, and the worker
//! handle are `None`/zero together and `Some`/nonzero together — there is
//! no separate atomic guarding the count, only this mutex, resolving the
//! redundant lock-plus-atomic discipline the original left open (see
//! DESIGN.md).

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use mio::{Poll, Registry, Token, Waker};
use once_cell::sync::Lazy;
use slab::Slab;

use crate::clock::{Clock, SystemClock};
use crate::instance::InstanceShared;
use crate::reactor;
use crate::EmulatorError;

pub(crate) const WAKER_TOKEN: Token = Token(usize::MAX);

struct ReactorCore {
    registry: Registry,
    waker: Arc<Waker>,
    instances: Arc<Mutex<Slab<Arc<InstanceShared>>>>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

struct LifecycleState {
    count: usize,
    core: Option<ReactorCore>,
}

static LIFECYCLE: Lazy<Mutex<LifecycleState>> = Lazy::new(|| {
    Mutex::new(LifecycleState {
        count: 0,
        core: None,
    })
});

/// Registers a newly-started instance with the process-global reactor,
/// starting the reactor thread if this is the first live instance.
/// Returns the `Token` the instance was assigned and a clone of the
/// reactor's `Registry` to register its channel with.
pub(crate) fn register(shared: Arc<InstanceShared>) -> io::Result<(Token, Registry)> {
    let mut state = LIFECYCLE.lock().unwrap();

    if state.core.is_none() {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        let instances: Arc<Mutex<Slab<Arc<InstanceShared>>>> = Arc::new(Mutex::new(Slab::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_instances = instances.clone();
        let thread_shutdown = shutdown.clone();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let handle = thread::Builder::new()
            .name("netem-reactor".into())
            .spawn(move || reactor::run(poll, thread_instances, thread_shutdown, clock))
            .map_err(|e| io::Error::other(e.to_string()))?;

        tracing::info!("reactor thread started");
        state.core = Some(ReactorCore {
            registry,
            waker,
            instances,
            shutdown,
            thread: Some(handle),
        });
    }

    state.count += 1;
    let core = state.core.as_ref().expect("core just created or already present");
    let token = Token(core.instances.lock().unwrap().insert(shared));
    let registry = core.registry.try_clone()?;
    Ok((token, registry))
}

/// Deregisters an instance, tearing down the reactor thread if this was
/// the last live instance. Blocks until the reactor thread has exited
/// when it is the last.
pub(crate) fn unregister(token: Token) -> Result<(), EmulatorError> {
    let mut state = LIFECYCLE.lock().unwrap();

    if let Some(core) = state.core.as_ref() {
        let mut instances = core.instances.lock().unwrap();
        if instances.contains(token.0) {
            instances.remove(token.0);
        }
    }

    state.count = state.count.saturating_sub(1);

    if state.count == 0 {
        if let Some(mut core) = state.core.take() {
            core.shutdown.store(true, Ordering::Release);
            let _ = core.waker.wake();
            if let Some(handle) = core.thread.take() {
                handle.join().map_err(|_| EmulatorError::Interrupted)?;
            }
            tracing::info!("reactor thread stopped");
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn live_instance_count() -> usize {
    LIFECYCLE.lock().unwrap().count
}
