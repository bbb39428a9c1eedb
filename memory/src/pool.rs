use std::collections::HashMap;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use parking_lot::{Mutex, RwLock};
use anyhow::Result;
use tracing::trace;

use core_types::BufferId;

/// Host storage behind one buffer. Words keep every supported element aligned.
pub type HostBuffer = Arc<RwLock<Vec<u64>>>;

struct BufferEntry {
    buffer: HostBuffer,
    size: usize,
}

/// thread-safe pool of host buffers
pub struct BufferPool {
    next_id: AtomicU64,
    entries: Mutex<HashMap<BufferId, BufferEntry>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a zeroed buffer of `size_bytes`, returning a unique ID and its handle
    pub fn create_buffer(&self, size_bytes: usize) -> Result<(BufferId, HostBuffer)> {
        let words = size_bytes.div_ceil(std::mem::size_of::<u64>());
        let handle: HostBuffer = Arc::new(RwLock::new(vec![0u64; words]));
        let id = BufferId(self.next_id.fetch_add(1, Ordering::Relaxed));

        self.entries.lock().insert(id, BufferEntry {
            buffer: handle.clone(),
            size: size_bytes,
        });
        trace!(%id, size_bytes, "allocated host buffer");
        Ok((id, handle))
    }

    /// Retrieve a clonable handle to the buffer for a given ID
    pub fn get(&self, id: BufferId) -> Option<HostBuffer> {
        self.entries.lock().get(&id).map(|e| e.buffer.clone())
    }

    pub fn get_buffer_size(&self, id: BufferId) -> Option<usize> {
        self.entries.lock().get(&id).map(|e| e.size)
    }

    /// Explicitly release a buffer by its ID
    pub fn release_buffer(&self, id: BufferId) -> bool {
        let removed = self.entries.lock().remove(&id).is_some();
        if removed {
            trace!(%id, "released host buffer");
        }
        removed
    }

    /// Number of live buffers
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_pool_allocation() {
        let pool = BufferPool::new();

        let (id, handle) = pool.create_buffer(1024).expect("Failed to allocate buffer");
        assert!(pool.get(id).is_some(), "Buffer should be allocated");
        assert_eq!(handle.read().len(), 128, "1024 bytes are 128 words");

        let size = pool.get_buffer_size(id).expect("Buffer size should be available");
        assert_eq!(size, 1024, "Expected buffer size to be 1024 bytes");

        // Release the buffer
        assert!(pool.release_buffer(id));
        assert!(pool.get(id).is_none(), "Buffer should be released");
        assert!(!pool.release_buffer(id), "Second release is a no-op");
    }

    #[test]
    fn ids_are_unique_and_sizes_round_up() {
        let pool = BufferPool::new();
        let (a, held) = pool.create_buffer(12).unwrap();
        let (b, _) = pool.create_buffer(12).unwrap();
        assert_ne!(a, b);
        assert_eq!(held.read().len(), 2, "odd sizes round up to whole words");
        assert_eq!(pool.get_buffer_size(a), Some(12));
        assert_eq!(pool.len(), 2);
    }
}
