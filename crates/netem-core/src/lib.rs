//! # netem-core
//!
//! The impairment relay engine: a non-blocking reactor that relays UDP
//! datagrams between two fixed peers through a pluggable impairment
//! policy, applying latency, jitter, loss, and duplication to each
//! datagram without copying payloads across duplicates.
//!
//! This crate is payload-transparent and does not implement any specific
//! impairment model — see the sibling `netem-policy` crate for the
//! reference loss/jitter/duplication policy.

mod buffer;
mod clock;
mod endpoint;
mod error;
mod instance;
mod lifecycle;
mod policy;
mod queue;
mod reactor;
mod scheduled;

pub use buffer::{Buffer, BufferPool};
pub use clock::{Clock, SystemClock};
pub use endpoint::Endpoint;
pub use error::EmulatorError;
pub use instance::{EmulatorConfig, EmulatorInstance};
pub use policy::ImpairmentPolicy;
pub use queue::DeliveryQueue;
pub use scheduled::{DuplicateCounter, Scheduled};

/// Minimum non-fragmenting IPv4 payload: 576 (min reassembly buffer) - 60 (max IP header) - 8 (UDP header).
pub const DEFAULT_MAX_PACKET_SIZE: usize = 508;

/// Number of buffers allocated per pool growth batch.
pub const BUFFER_BATCH_SIZE: usize = 16;

#[cfg(test)]
pub mod test_util;
