//! Reusable byte buffers for streaming copies
//!
//! Millions of small transfers would otherwise allocate a fresh copy
//! buffer each; the pool amortizes that to a handful of allocations.
//! Buffers returned to the pool are not zeroed - callers must overwrite
//! before reading.

use parking_lot::Mutex;

/// Default size of pooled byte buffers.
///
/// 1 MiB is 32x the stdlib copy default, trading memory for dramatically
/// fewer syscalls on sequential bulk I/O.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Thread-safe free list of fixed-size byte buffers
pub struct BufferPool {
    size: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    /// Create a pool handing out buffers of `size` bytes.
    /// A size of 0 selects [`DEFAULT_BUFFER_SIZE`].
    pub fn new(size: usize) -> Self {
        let size = if size == 0 { DEFAULT_BUFFER_SIZE } else { size };
        Self {
            size,
            free: Mutex::new(Vec::new()),
        }
    }

    /// Size of the buffers this pool hands out
    pub fn buffer_size(&self) -> usize {
        self.size
    }

    /// Take a buffer from the pool, allocating one if the free list is empty.
    /// The returned buffer has `len() == buffer_size()` and arbitrary contents.
    pub fn get(&self) -> Vec<u8> {
        if let Some(buf) = self.free.lock().pop() {
            return buf;
        }
        vec![0u8; self.size]
    }

    /// Return a buffer to the pool.
    /// Buffers of the wrong size are dropped rather than recycled.
    pub fn put(&self, buf: Vec<u8>) {
        if buf.len() == self.size {
            self.free.lock().push(buf);
        }
    }

    /// Number of buffers currently sitting in the free list
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}
