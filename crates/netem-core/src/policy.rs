use crate::Scheduled;

/// An impairment model: given the current tick's clock sample and a
/// read-only view of everything already pending for this instance,
/// emits zero or more future delivery deadlines for a just-received
/// datagram.
///
/// - An empty `out_deadlines` means the datagram is dropped.
/// - One deadline means it is relayed once.
/// - N deadlines means it is duplicated N-1 times, one send per deadline.
///
/// `compute` is called from the reactor thread only, serially with
/// respect to the owning instance — implementations need not synchronize
/// internally for per-instance state, though parameters mutated from
/// other threads (see the reference policy) must use their own interior
/// mutability.
pub trait ImpairmentPolicy: Send + Sync {
    /// Appends 0..N future millisecond deadlines to `out_deadlines`,
    /// which is guaranteed to be empty on entry.
    fn compute(&self, now_ms: u64, pending: &[&Scheduled], out_deadlines: &mut Vec<u64>);
}
