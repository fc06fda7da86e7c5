//! Bounded pool of reusable transfer buffers, limiting concurrent transfer
//! work to the number of buffers (spec §4.H "Buffer pool" / "Backpressure").

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

struct Inner {
    buffers: VecDeque<Vec<u8>>,
}

pub struct BufferPool {
    inner: Mutex<Inner>,
    condvar: Condvar,
    buffer_size: usize,
}

impl BufferPool {
    /// `capacity = ceil(buffer_heap_size / buffer_size)` reusable buffers,
    /// each pre-allocated to `buffer_size` bytes.
    pub fn new(buffer_heap_size: u64, buffer_size: usize) -> Self {
        let capacity = (buffer_heap_size as usize).div_ceil(buffer_size).max(1);
        let buffers = (0..capacity).map(|_| Vec::with_capacity(buffer_size)).collect();
        BufferPool {
            inner: Mutex::new(Inner { buffers }),
            condvar: Condvar::new(),
            buffer_size,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Blocks until a buffer is available.
    pub fn acquire(&self) -> Vec<u8> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(mut buf) = inner.buffers.pop_front() {
                buf.clear();
                return buf;
            }
            inner = self.condvar.wait(inner).unwrap();
        }
    }

    pub fn release(&self, buffer: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        inner.buffers.push_back(buffer);
        self.condvar.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_ceil_division() {
        let pool = BufferPool::new(10 * 1024 * 1024, 4 * 1024 * 1024);
        assert_eq!(pool.inner.lock().unwrap().buffers.len(), 3);
    }

    #[test]
    fn acquire_release_roundtrip() {
        let pool = BufferPool::new(4 * 1024 * 1024, 4 * 1024 * 1024);
        let buf = pool.acquire();
        assert_eq!(pool.inner.lock().unwrap().buffers.len(), 0);
        pool.release(buf);
        assert_eq!(pool.inner.lock().unwrap().buffers.len(), 1);
    }
}
