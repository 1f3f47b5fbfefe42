//! End-to-end scenarios against real loopback UDP sockets and the live
//! reactor thread, covering the scenario table in spec.md §8.

use std::collections::HashSet;
use std::net::UdpSocket as StdUdpSocket;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use netem_core::{EmulatorConfig, EmulatorInstance, Endpoint, ImpairmentPolicy, Scheduled};

/// A policy with fixed, deterministic parameters for tests — no randomness.
struct FixedPolicy {
    loss: f64,
    duplication_count: usize,
    delay_ms: u64,
}

impl ImpairmentPolicy for FixedPolicy {
    fn compute(&self, now_ms: u64, _pending: &[&Scheduled], out: &mut Vec<u64>) {
        if self.loss >= 1.0 {
            return;
        }
        for _ in 0..=self.duplication_count {
            out.push(now_ms + self.delay_ms);
        }
    }
}

/// Scenario 4's jitter policy: every ingress datagram is relayed once
/// (`loss=0, dup=0`), with a deterministic pseudo-jitter offset in
/// `[0, jitter_ms]` so arrivals can interleave without depending on an
/// RNG.
struct JitterPolicy {
    jitter_ms: u64,
    calls: AtomicU64,
}

impl ImpairmentPolicy for JitterPolicy {
    fn compute(&self, now_ms: u64, _pending: &[&Scheduled], out: &mut Vec<u64>) {
        let i = self.calls.fetch_add(1, AtomicOrdering::Relaxed);
        let offset = (i * 37) % (self.jitter_ms + 1);
        out.push(now_ms + offset);
    }
}

fn bind_peer() -> StdUdpSocket {
    let socket = StdUdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_millis(500)))
        .unwrap();
    socket
}

fn start_instance<P: ImpairmentPolicy + 'static>(
    peer_a: &StdUdpSocket,
    peer_b: &StdUdpSocket,
    policy: P,
) -> EmulatorInstance {
    let emulator_addr: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();
    let config = EmulatorConfig::new(
        Endpoint::new(emulator_addr),
        Endpoint::new(peer_a.local_addr().unwrap()),
        Endpoint::new(peer_b.local_addr().unwrap()),
    );
    let mut instance = EmulatorInstance::new(config, Arc::new(policy));
    instance.start().expect("instance should start");
    instance
}

/// Scenario 1: identity under zero impairment.
#[test]
fn identity_under_zero_impairment() {
    let peer_a = bind_peer();
    let peer_b = bind_peer();
    let policy = FixedPolicy {
        loss: 0.0,
        duplication_count: 0,
        delay_ms: 0,
    };
    let mut instance = start_instance(&peer_a, &peer_b, policy);
    let emulator_addr = instance_bound_addr(&instance);

    peer_a.send_to(&[0x01], emulator_addr).unwrap();

    let mut buf = [0u8; 16];
    let (n, from) = peer_b.recv_from(&mut buf).expect("peer B should receive");
    assert_eq!(&buf[..n], &[0x01]);
    assert_eq!(from, emulator_addr);

    instance.stop().unwrap();
}

/// Scenario 2: fixed delay bounds the arrival time.
#[test]
fn fixed_delay_bounds_arrival() {
    let peer_a = bind_peer();
    let peer_b = bind_peer();
    let policy = FixedPolicy {
        loss: 0.0,
        duplication_count: 0,
        delay_ms: 100,
    };
    let mut instance = start_instance(&peer_a, &peer_b, policy);
    let emulator_addr = instance_bound_addr(&instance);

    let sent_at = std::time::Instant::now();
    peer_a.send_to(&[0xAA, 0xBB], emulator_addr).unwrap();

    let mut buf = [0u8; 16];
    let (n, _) = peer_b.recv_from(&mut buf).expect("peer B should receive");
    let elapsed = sent_at.elapsed();

    assert_eq!(&buf[..n], &[0xAA, 0xBB]);
    assert!(elapsed >= Duration::from_millis(95), "arrived too early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "arrived too late: {elapsed:?}");

    instance.stop().unwrap();
}

/// Scenario 3: loss = 1.0 sink — nothing ever arrives.
#[test]
fn loss_one_is_a_sink() {
    let peer_a = bind_peer();
    let peer_b = bind_peer();
    let policy = FixedPolicy {
        loss: 1.0,
        duplication_count: 0,
        delay_ms: 0,
    };
    let mut instance = start_instance(&peer_a, &peer_b, policy);
    let emulator_addr = instance_bound_addr(&instance);

    for i in 0..20u8 {
        peer_a.send_to(&[i], emulator_addr).unwrap();
    }

    let mut buf = [0u8; 16];
    let result = peer_b.recv_from(&mut buf);
    assert!(result.is_err(), "peer B should never receive under loss=1.0");

    instance.stop().unwrap();
}

/// Scenario 4: jitter-bounded reordering. With loss=0, dup=0, every one
/// of N datagrams arrives exactly once; the set of bodies received must
/// equal the set sent, though arrival order is free to differ under
/// jitter.
#[test]
fn jitter_bounded_reordering() {
    let peer_a = bind_peer();
    peer_a.set_read_timeout(Some(Duration::from_millis(2_000))).unwrap();
    let peer_b = bind_peer();
    peer_b.set_read_timeout(Some(Duration::from_millis(2_000))).unwrap();

    let policy = JitterPolicy {
        jitter_ms: 50,
        calls: AtomicU64::new(0),
    };
    let mut instance = start_instance(&peer_a, &peer_b, policy);
    let emulator_addr = instance_bound_addr(&instance);

    const COUNT: u32 = 1_000;
    for seq in 0..COUNT {
        peer_a.send_to(&seq.to_le_bytes(), emulator_addr).unwrap();
    }

    let mut received = HashSet::with_capacity(COUNT as usize);
    let mut buf = [0u8; 16];
    for _ in 0..COUNT {
        let (n, _) = peer_b.recv_from(&mut buf).expect("peer B should receive every datagram");
        assert_eq!(n, 4);
        let seq = u32::from_le_bytes(buf[..4].try_into().unwrap());
        received.insert(seq);
    }

    let expected: HashSet<u32> = (0..COUNT).collect();
    assert_eq!(received, expected, "body set must match the input set exactly");

    instance.stop().unwrap();
}

/// Scenario 5: stranger traffic is dropped, never forwarded.
#[test]
fn stranger_traffic_is_dropped() {
    let peer_a = bind_peer();
    let peer_b = bind_peer();
    let stranger = bind_peer();
    let policy = FixedPolicy {
        loss: 0.0,
        duplication_count: 0,
        delay_ms: 0,
    };
    let mut instance = start_instance(&peer_a, &peer_b, policy);
    let emulator_addr = instance_bound_addr(&instance);

    stranger.send_to(&[0x99], emulator_addr).unwrap();

    let mut buf = [0u8; 16];
    assert!(peer_a.recv_from(&mut buf).is_err());
    assert!(peer_b.recv_from(&mut buf).is_err());

    instance.stop().unwrap();
}

/// Duplication lower bound: with loss=0, every ingress datagram produces
/// at least one egress datagram (here configured for exactly two).
#[test]
fn duplication_produces_multiple_copies() {
    let peer_a = bind_peer();
    let peer_b = bind_peer();
    let policy = FixedPolicy {
        loss: 0.0,
        duplication_count: 1, // one duplicate => two deadlines per datagram
        delay_ms: 0,
    };
    let mut instance = start_instance(&peer_a, &peer_b, policy);
    let emulator_addr = instance_bound_addr(&instance);

    peer_a.send_to(&[0x07], emulator_addr).unwrap();

    let mut buf = [0u8; 16];
    let (n1, _) = peer_b.recv_from(&mut buf).expect("first copy");
    assert_eq!(&buf[..n1], &[0x07]);
    let (n2, _) = peer_b.recv_from(&mut buf).expect("second copy");
    assert_eq!(&buf[..n2], &[0x07]);

    instance.stop().unwrap();
}

/// start/stop are each single-use: a second start on a stopped instance fails.
#[test]
fn stopped_instance_cannot_restart() {
    let peer_a = bind_peer();
    let peer_b = bind_peer();
    let policy = FixedPolicy {
        loss: 0.0,
        duplication_count: 0,
        delay_ms: 0,
    };
    let mut instance = start_instance(&peer_a, &peer_b, policy);
    instance.stop().unwrap();

    let err = instance.start().unwrap_err();
    assert!(matches!(err, netem_core::EmulatorError::ChannelClosed));
}

fn instance_bound_addr(instance: &EmulatorInstance) -> std::net::SocketAddr {
    instance
        .local_addr()
        .expect("instance must be started before its bound address is known")
}
