//! Fixed-capacity scratch buffer for one pump direction.
//!
//! Allocated once, never grows. Its capacity is the hard ceiling on the size
//! of a single read or write the pump performs.

/// Scratch space for a single read/write cycle.
#[derive(Debug)]
pub struct ScratchBuffer {
    /// Backing storage, allocated once.
    buf: Box<[u8]>,

    /// Bytes filled by the last read.
    len: usize,
}

impl ScratchBuffer {
    /// Create a buffer with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Clear and hand out the whole backing storage for a read.
    pub fn spare(&mut self) -> &mut [u8] {
        self.len = 0;
        &mut self.buf
    }

    /// Record how many bytes the last read filled.
    ///
    /// Clamped to capacity.
    pub fn set_filled(&mut self, n: usize) {
        self.len = n.min(self.buf.len());
    }

    /// Fill from a reader closure and return the filled slice.
    pub fn fill_with<F>(&mut self, read: F) -> &[u8]
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        let n = read(self.spare());
        self.set_filled(n);
        self.filled()
    }

    /// The bytes from the last read.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Whether the last read was exactly the single byte `byte`.
    pub fn is_exactly(&self, byte: u8) -> bool {
        self.filled() == [byte]
    }

    /// Get the capacity.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Get the filled length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the last read was empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forget the last read.
    pub fn clear(&mut self) {
        self.len = 0;
    }
}
