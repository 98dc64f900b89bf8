//! Sliding-window ring buffer for LZ77 decompression.
//!
//! The Brotli decoder writes its output through a power-of-two window of
//! `2^lgwin` bytes. Back-references address the window with mask arithmetic:
//! `(pos - distance) & (size - 1)`. A fixed slack region after the window
//! lets the copy loops overshoot the logical end without bounds checks; the
//! overshoot is folded back to the front after each wrap.
//!
//! The buffer starts small and grows toward the window size as output
//! accumulates, so decoding a short stream under a 16 MB window does not
//! allocate 16 MB. Growth only happens before the first wrap, while the
//! contents are still linear.

/// Bytes of over-copy slack kept past the window; sized for the longest
/// transformed dictionary word a copy can deposit in one write.
pub const RING_SLACK: usize = 37;

/// Smallest ring allocation.
const MIN_RING_SIZE: usize = 1024;

/// The decoder window.
#[derive(Debug)]
pub struct RingBuffer {
    /// Backing storage, `size + RING_SLACK` bytes.
    data: Vec<u8>,
    /// Current ring size; a power of two, at most `window_size`.
    size: usize,
    /// Target window size (`2^lgwin`).
    window_size: usize,
}

impl RingBuffer {
    /// Create a lazily-sized ring for a `2^lgwin` window.
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is not a power of two.
    pub fn new(window_size: usize) -> Self {
        assert!(
            window_size.is_power_of_two(),
            "window size must be a power of 2, got {}",
            window_size
        );
        Self {
            data: Vec::new(),
            size: 0,
            window_size,
        }
    }

    /// Current ring size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Address mask (`size - 1`).
    #[inline]
    pub fn mask(&self) -> usize {
        self.size.wrapping_sub(1)
    }

    /// The target window size.
    #[inline]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Grow the ring so it can hold `total` bytes of as-yet-unwrapped
    /// output, preserving contents. No-op once the ring is at full window
    /// size. Must not be called after the write cursor has wrapped.
    pub fn ensure_capacity(&mut self, total: usize) {
        if self.size >= self.window_size {
            return;
        }
        let wanted = total
            .next_power_of_two()
            .clamp(MIN_RING_SIZE, self.window_size);
        if wanted > self.size {
            self.size = wanted;
            self.data.resize(self.size + RING_SLACK, 0);
        }
    }

    /// The backing bytes, including slack.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable backing bytes, including slack.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Fold `overshoot` bytes written past the logical end back onto the
    /// front after a wrap: bytes at `[size, size + overshoot)` belong at
    /// `[0, overshoot)`.
    pub fn fold_slack(&mut self, overshoot: usize) {
        debug_assert!(overshoot <= RING_SLACK);
        let size = self.size;
        self.data.copy_within(size..size + overshoot, 0);
    }
}
