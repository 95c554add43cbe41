//! Fixed-capacity recycling of raw frame buffers.

/// Holds sample buffers retired from the raw-frame window.
///
/// The pipeline only ever needs the current and previous raw frame, so the
/// pool is tiny; anything released beyond `capacity` is dropped.
#[derive(Debug)]
pub struct FramePool {
    free: Vec<Vec<u8>>,
    capacity: usize,
    reused: u64,
    released: u64,
}

impl FramePool {
    /// Creates a pool keeping at most `capacity` buffers.
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            reused: 0,
            released: 0,
        }
    }

    /// Takes a recycled buffer, if one is available.
    pub fn acquire(&mut self) -> Option<Vec<u8>> {
        let buffer = self.free.pop();
        if buffer.is_some() {
            self.reused += 1;
        }
        buffer
    }

    /// Returns a buffer to the pool.
    pub fn release(&mut self, mut buffer: Vec<u8>) {
        self.released += 1;
        if self.free.len() < self.capacity {
            buffer.clear();
            self.free.push(buffer);
        }
    }

    /// Buffers currently waiting for reuse.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Number of times a recycled buffer was handed out.
    pub fn reused(&self) -> u64 {
        self.reused
    }

    /// Number of buffers returned, including dropped ones.
    pub fn released(&self) -> u64 {
        self.released
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new(2)
    }
}
