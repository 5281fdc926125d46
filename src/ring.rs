//! Fixed-capacity sample ring for interrupt-driven acquisition.
//!
//! The interrupt handler pushes one DATAIN sample per trigger and raw reads pop
//! them in arrival order. The ring never refuses a sample: once full, each push
//! silently discards the oldest sample so a slow reader always sees the most
//! recent [`RING_CAPACITY`] captures.
//!
//! ```text
//!   head ─┐           ┌─ tail
//!         ▼           ▼
//!   [ . | 3 | 4 | 5 | . | . | . | . ]    len = 3
//! ```
//!
//! The ring does no locking of its own; it lives inside the device session and
//! is only touched while the exclusivity lock is held.

/// Number of samples the device ring holds.
pub const RING_CAPACITY: usize = 8;

/// Circular FIFO of 32-bit samples with overwrite-on-full semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRing<const N: usize = RING_CAPACITY> {
    data: [u32; N],
    head: usize,
    tail: usize,
    len: usize,
}

impl<const N: usize> SampleRing<N> {
    /// Create an empty ring.
    pub const fn new() -> Self {
        const { assert!(N > 0, "SampleRing capacity must be non-zero") };
        Self {
            data: [0; N],
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Reset to the empty state.
    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// Append `sample`, evicting the oldest sample if the ring is full.
    ///
    /// Returns the evicted sample, if any.
    pub fn push(&mut self, sample: u32) -> Option<u32> {
        let evicted = self.is_full().then(|| self.data[self.tail]);

        self.data[self.tail] = sample;
        self.tail = (self.tail + 1) % N;
        if self.len < N {
            self.len += 1;
        } else {
            self.head = (self.head + 1) % N;
        }

        evicted
    }

    /// Remove and return the oldest sample, or `None` if the ring is empty.
    pub fn pop(&mut self) -> Option<u32> {
        if self.len == 0 {
            return None;
        }
        let sample = self.data[self.head];
        self.head = (self.head + 1) % N;
        self.len -= 1;
        Some(sample)
    }

    /// Number of samples waiting.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no samples are waiting.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the next push will evict a sample.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    /// Maximum number of samples held.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for SampleRing<N> {
    fn default() -> Self {
        Self::new()
    }
}
