use std::cell::UnsafeCell;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use mio::net::UdpSocket as MioUdpSocket;
use mio::{Interest, Registry, Token};

use crate::{
    lifecycle, BufferPool, DeliveryQueue, DuplicateCounter, Endpoint, ImpairmentPolicy, Scheduled,
    DEFAULT_MAX_PACKET_SIZE,
};
use crate::error::EmulatorError;

/// Immutable configuration for one emulator instance.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// The local address bound for receiving/sending.
    pub emulator_endpoint: Endpoint,
    /// One of the two endpoints whose traffic is relayed to the other.
    pub peer_a: Endpoint,
    /// The other endpoint.
    pub peer_b: Endpoint,
    /// Strictly positive upper bound on a single datagram payload.
    pub max_packet_size: usize,
}

impl EmulatorConfig {
    pub fn new(emulator_endpoint: Endpoint, peer_a: Endpoint, peer_b: Endpoint) -> Self {
        EmulatorConfig {
            emulator_endpoint,
            peer_a,
            peer_b,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        assert!(max_packet_size > 0, "max_packet_size must be strictly positive");
        self.max_packet_size = max_packet_size;
        self
    }
}

/// State shared between the caller thread (`start`/`stop`) and the
/// reactor thread.
///
/// `socket` is a genuine cross-thread resource — `stop()` can race the
/// reactor mid-iteration (the "channel closed by another thread" benign
/// race) — so it stays behind a `Mutex`. `pool` and `queue` are, per the
/// packet-path concurrency model, touched only by the reactor thread
/// once `start()` has registered the channel: no other thread ever
/// calls `drain_ingress`/`drain_egress`/`has_due_head` for a given
/// instance. They are held in `UnsafeCell` with no locking to match
/// that model exactly.
pub(crate) struct InstanceShared {
    pub(crate) config: EmulatorConfig,
    pub(crate) policy: Arc<dyn ImpairmentPolicy>,
    pool: UnsafeCell<BufferPool>,
    queue: UnsafeCell<DeliveryQueue>,
    pub(crate) socket: Mutex<Option<MioUdpSocket>>,
    pub(crate) registry: OnceLock<Registry>,
    pub(crate) token: OnceLock<Token>,
    pub(crate) stopped: AtomicBool,
}

// Safety: `pool` and `queue` are reached only from the single reactor
// thread, serially, for the lifetime of an instance — never from the
// caller thread and never reentrantly. No unsynchronized concurrent
// access to either cell's contents is possible.
unsafe impl Sync for InstanceShared {}

impl InstanceShared {
    fn new(config: EmulatorConfig, policy: Arc<dyn ImpairmentPolicy>, pool: BufferPool) -> Self {
        InstanceShared {
            config,
            policy,
            pool: UnsafeCell::new(pool),
            queue: UnsafeCell::new(DeliveryQueue::new()),
            socket: Mutex::new(None),
            registry: OnceLock::new(),
            token: OnceLock::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Safety: caller must be the reactor thread (see the `Sync` impl above).
    #[allow(clippy::mut_from_ref)]
    fn pool_mut(&self) -> &mut BufferPool {
        unsafe { &mut *self.pool.get() }
    }

    /// Safety: caller must be the reactor thread (see the `Sync` impl above).
    #[allow(clippy::mut_from_ref)]
    fn queue_mut(&self) -> &mut DeliveryQueue {
        unsafe { &mut *self.queue.get() }
    }

    fn classify(&self, src: Endpoint) -> Option<Endpoint> {
        if src == self.config.peer_a {
            Some(self.config.peer_b)
        } else if src == self.config.peer_b {
            Some(self.config.peer_a)
        } else {
            None
        }
    }

    pub(crate) fn has_due_head(&self, now_ms: u64) -> bool {
        self.queue_mut()
            .peek()
            .map(|e| e.is_ready(now_ms))
            .unwrap_or(false)
    }

    pub(crate) fn set_write_interest(&self, registry: &Registry, token: Token) {
        let mut guard = self.socket.lock().unwrap();
        if let Some(socket) = guard.as_mut() {
            if let Err(e) = registry.reregister(socket, token, Interest::READABLE | Interest::WRITABLE) {
                tracing::debug!(error = %e, "benign race setting write interest on a closing channel");
            }
        }
    }

    pub(crate) fn clear_write_interest(&self, registry: &Registry, token: Token) {
        let mut guard = self.socket.lock().unwrap();
        if let Some(socket) = guard.as_mut() {
            if let Err(e) = registry.reregister(socket, token, Interest::READABLE) {
                tracing::debug!(error = %e, "benign race clearing write interest on a closing channel");
            }
        }
    }

    /// Ingress: drain the channel until it would block, assigning each
    /// received datagram 0..N delivery deadlines under the impairment
    /// policy.
    pub(crate) fn drain_ingress(&self, now_ms: u64) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        loop {
            let mut guard = self.socket.lock().unwrap();
            let Some(socket) = guard.as_mut() else { return };

            let mut buf = self.pool_mut().acquire();

            match socket.recv_from(buf.as_mut_slice()) {
                Ok((n, src_addr)) => {
                    drop(guard);
                    buf.set_len(n);
                    let src: Endpoint = src_addr.into();
                    let Some(dst) = self.classify(src) else {
                        // Stranger traffic: made progress, consumed no slot.
                        self.pool_mut().release(buf);
                        continue;
                    };

                    let mut deadlines = Vec::new();
                    {
                        let queue = self.queue_mut();
                        let pending = queue.snapshot();
                        self.policy.compute(now_ms, &pending, &mut deadlines);
                    }

                    if deadlines.is_empty() {
                        self.pool_mut().release(buf);
                        continue;
                    }

                    let counter = Arc::new(DuplicateCounter::new());
                    let buffer = Arc::new(buf);
                    let queue = self.queue_mut();
                    for deadline_ms in deadlines {
                        counter.increment();
                        queue.push(Scheduled {
                            buffer: buffer.clone(),
                            destination: dst,
                            deadline_ms,
                            counter: counter.clone(),
                        });
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    drop(guard);
                    self.pool_mut().release(buf);
                    return;
                }
                Err(e) => {
                    drop(guard);
                    self.pool_mut().release(buf);
                    tracing::debug!(error = %e, "benign race or transient receive error");
                    return;
                }
            }
        }
    }

    /// Egress: send every due head while the channel accepts writes,
    /// reclaiming the shared buffer once the last duplicate is sent.
    pub(crate) fn drain_egress(&self, now_ms: u64) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        loop {
            let due = {
                let queue = self.queue_mut();
                match queue.peek() {
                    Some(head) if head.is_ready(now_ms) => queue.pop(),
                    _ => None,
                }
            };
            let Some(head) = due else { return };

            let mut guard = self.socket.lock().unwrap();
            let Some(socket) = guard.as_mut() else { return };
            let result = socket.send_to(head.buffer.as_slice(), head.destination.addr());
            drop(guard);

            match result {
                Ok(n) if n > 0 => {
                    self.reclaim(head);
                }
                Ok(_) => {
                    // Kernel accepted zero bytes — treat like a full send buffer.
                    self.queue_mut().push(head);
                    return;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.queue_mut().push(head);
                    return;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "egress send failed, dropping entry");
                    self.reclaim(head);
                }
            }
        }
    }

    fn reclaim(&self, entry: Scheduled) {
        let Scheduled { buffer, counter, .. } = entry;
        if counter.decrement() == 1 {
            if let Ok(buf) = Arc::try_unwrap(buffer) {
                self.pool_mut().release(buf);
            }
        }
    }
}

/// One emulator instance: owns a non-blocking UDP channel bound to
/// `emulator_endpoint`, a buffer pool, a delivery queue, and a policy.
/// Knows the two peer endpoints. Created eagerly (no I/O), activated on
/// `start`, deactivated on `stop`; once deactivated it is not reusable.
pub struct EmulatorInstance {
    shared: Arc<InstanceShared>,
    activated: bool,
    deactivated: bool,
}

impl EmulatorInstance {
    /// Constructs an instance without opening any channel. Pre-allocates
    /// one batch of buffers.
    pub fn new(config: EmulatorConfig, policy: Arc<dyn ImpairmentPolicy>) -> Self {
        let mut pool = BufferPool::new(config.max_packet_size);
        // Pre-allocate the first batch eagerly, per spec 4.E.
        let warm = pool.acquire();
        pool.release(warm);

        let shared = Arc::new(InstanceShared::new(config, policy, pool));

        EmulatorInstance {
            shared,
            activated: false,
            deactivated: false,
        }
    }

    /// Opens a non-blocking UDP channel bound to `emulator_endpoint`,
    /// registers it with the process-global reactor for read-readiness,
    /// and increments the global instance count (starting the reactor
    /// thread if this is the first live instance).
    pub fn start(&mut self) -> Result<(), EmulatorError> {
        if self.deactivated {
            return Err(EmulatorError::ChannelClosed);
        }

        let mut socket = MioUdpSocket::bind(self.shared.config.emulator_endpoint.addr())?;

        let (token, registry) = lifecycle::register(self.shared.clone())
            .map_err(EmulatorError::Io)?;

        registry.register(&mut socket, token, Interest::READABLE)?;

        *self.shared.socket.lock().unwrap() = Some(socket);
        let _ = self.shared.token.set(token);
        let _ = self.shared.registry.set(registry);

        self.activated = true;
        tracing::info!(endpoint = %self.shared.config.emulator_endpoint, "emulator instance started");
        Ok(())
    }

    /// Cancels the selection key, closes the channel, and decrements the
    /// global instance count, joining and tearing down the reactor
    /// thread if this was the last live instance. Blocks until the
    /// reactor thread has exited when it is the last.
    pub fn stop(&mut self) -> Result<(), EmulatorError> {
        if !self.activated || self.deactivated {
            return Ok(());
        }

        self.shared.stopped.store(true, Ordering::Release);

        if let (Some(registry), Some(mut socket)) = (
            self.shared.registry.get(),
            self.shared.socket.lock().unwrap().take(),
        ) {
            let _ = registry.deregister(&mut socket);
        }

        if let Some(token) = self.shared.token.get().copied() {
            lifecycle::unregister(token)?;
        }

        self.deactivated = true;
        tracing::info!(endpoint = %self.shared.config.emulator_endpoint, "emulator instance stopped");
        Ok(())
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.shared.config
    }

    /// The channel's actual bound local address, once `start()` has
    /// succeeded. Differs from `config().emulator_endpoint` when the
    /// configured port was 0 (OS-assigned ephemeral port).
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.shared
            .socket
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|s| s.local_addr().ok())
    }
}

impl Drop for EmulatorInstance {
    fn drop(&mut self) {
        if self.activated && !self.deactivated {
            let _ = self.stop();
        }
    }
}
