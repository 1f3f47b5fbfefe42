use crate::BUFFER_BATCH_SIZE;

/// A mutable byte region of exact capacity `max_packet_size`, with a
/// current length <= capacity. Owned by a [`BufferPool`] when free, lent
/// to exactly one group of [`crate::Scheduled`] entries otherwise.
#[derive(Debug)]
pub struct Buffer {
    data: Box<[u8]>,
    len: usize,
}

impl Buffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Buffer {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The datagram payload currently held (read-only).
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The full backing region, for a receive to write into.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..]
    }

    /// Record how many bytes a receive actually filled.
    pub fn set_len(&mut self, len: usize) {
        debug_assert!(len <= self.data.len());
        self.len = len.min(self.data.len());
    }

    fn clear(&mut self) {
        self.len = 0;
    }
}

/// Fixed-size reusable buffer pool sized to the emulator's configured
/// maximum datagram length. Grows on demand in batches of
/// [`BUFFER_BATCH_SIZE`]; never shrinks.
pub struct BufferPool {
    capacity: usize,
    free: Vec<Buffer>,
    total_allocated: usize,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "max_packet_size must be strictly positive");
        BufferPool {
            capacity,
            free: Vec::new(),
            total_allocated: 0,
        }
    }

    /// Returns a cleared buffer, growing the pool by one batch first if empty.
    pub fn acquire(&mut self) -> Buffer {
        if self.free.is_empty() {
            self.grow();
        }
        let mut buf = self.free.pop().expect("just grown, pool cannot be empty");
        buf.clear();
        buf
    }

    /// Clears and returns a buffer to the pool.
    ///
    /// Double-release is a programming error: the invariant that every
    /// buffer is either free or owned by a non-empty duplicate group
    /// (never both) must be upheld by the caller. The pool does not
    /// attempt to detect it.
    pub fn release(&mut self, mut buf: Buffer) {
        buf.clear();
        self.free.push(buf);
    }

    fn grow(&mut self) {
        self.free.reserve(BUFFER_BATCH_SIZE);
        for _ in 0..BUFFER_BATCH_SIZE {
            self.free.push(Buffer::new(self.capacity));
        }
        self.total_allocated += BUFFER_BATCH_SIZE;
    }

    /// Total buffers ever allocated (append-only, never decreases).
    pub fn total_allocated(&self) -> usize {
        self.total_allocated
    }

    /// Buffers currently sitting free in the pool.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}
