//! Fixed-capacity packet buffer pool.
//!
//! [`PacketPool`] hands out [`PacketBuf`]s backed by pre-allocated storage.
//! A buffer goes back to the pool when it is dropped, or, once frozen into a
//! shared [`Bytes`] view, when the last view referencing it is dropped. The
//! free list is a lock-free [`ArrayQueue`] so the producer and consumer
//! threads can allocate and release without contending on a mutex.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use crossbeam::queue::ArrayQueue;
use thiserror::Error;

/// Errors raised by pool operations.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Every buffer is currently in use.
    #[error("packet pool exhausted ({capacity} buffers in use)")]
    Exhausted { capacity: usize },
    /// A write would exceed the fixed buffer size.
    #[error("packet buffer overflow: {attempted} bytes exceeds {capacity}")]
    Overflow { attempted: usize, capacity: usize },
    /// A pool cannot be built with zero buffers or zero-sized buffers.
    #[error("invalid pool geometry: {count} buffers of {size} bytes")]
    InvalidGeometry { count: usize, size: usize },
}

struct PoolShared {
    free: ArrayQueue<Vec<u8>>,
    buffer_size: usize,
    alloc_failures: AtomicU64,
}

impl PoolShared {
    fn release(&self, mut storage: Vec<u8>) {
        storage.clear();
        // The queue is sized to the pool capacity and every slot that leaves
        // it comes back exactly once, so this push cannot fail.
        let _ = self.free.push(storage);
    }
}

/// Pool of fixed-size packet buffers.
///
/// Cloning the pool yields another handle to the same storage.
#[derive(Clone)]
pub struct PacketPool {
    shared: Arc<PoolShared>,
}

impl PacketPool {
    /// Pre-allocate `count` buffers of `buffer_size` bytes each.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidGeometry`] when either argument is zero.
    pub fn new(count: usize, buffer_size: usize) -> Result<Self, PoolError> {
        if count == 0 || buffer_size == 0 {
            return Err(PoolError::InvalidGeometry {
                count,
                size: buffer_size,
            });
        }
        let free = ArrayQueue::new(count);
        for _ in 0..count {
            let _ = free.push(Vec::with_capacity(buffer_size));
        }
        Ok(Self {
            shared: Arc::new(PoolShared {
                free,
                buffer_size,
                alloc_failures: AtomicU64::new(0),
            }),
        })
    }

    /// Take a buffer from the pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Exhausted`] when no buffer is free.
    pub fn alloc(&self) -> Result<PacketBuf, PoolError> {
        let Some(data) = self.shared.free.pop() else {
            self.shared.alloc_failures.fetch_add(1, Ordering::Relaxed);
            return Err(PoolError::Exhausted {
                capacity: self.capacity(),
            });
        };
        Ok(PacketBuf {
            slot: Slot {
                data,
                home: Arc::clone(&self.shared),
            },
        })
    }

    /// Total number of buffers owned by the pool.
    #[must_use]
    pub fn capacity(&self) -> usize { self.shared.free.capacity() }

    /// Buffers currently free.
    #[must_use]
    pub fn available(&self) -> usize { self.shared.free.len() }

    /// Buffers currently handed out, including ones pinned by frozen views.
    #[must_use]
    pub fn in_use(&self) -> usize { self.capacity() - self.available() }

    /// Fixed size of every buffer.
    #[must_use]
    pub fn buffer_size(&self) -> usize { self.shared.buffer_size }

    /// Number of allocation attempts that found the pool empty.
    #[must_use]
    pub fn alloc_failures(&self) -> u64 { self.shared.alloc_failures.load(Ordering::Relaxed) }
}

impl fmt::Debug for PacketPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketPool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("buffer_size", &self.buffer_size())
            .finish()
    }
}

/// Storage on loan from a pool; returns itself on drop.
struct Slot {
    data: Vec<u8>,
    home: Arc<PoolShared>,
}

impl AsRef<[u8]> for Slot {
    fn as_ref(&self) -> &[u8] { &self.data }
}

impl Drop for Slot {
    fn drop(&mut self) { self.home.release(std::mem::take(&mut self.data)); }
}

/// A writable buffer on loan from a [`PacketPool`].
pub struct PacketBuf {
    slot: Slot,
}

impl PacketBuf {
    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize { self.slot.data.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.slot.data.is_empty() }

    /// Fixed capacity of the underlying pool buffer.
    #[must_use]
    pub fn capacity(&self) -> usize { self.slot.home.buffer_size }

    /// Bytes that can still be written.
    #[must_use]
    pub fn remaining(&self) -> usize { self.capacity() - self.len() }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] { &self.slot.data }

    /// Append `bytes`, refusing to grow past the pool's buffer size.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Overflow`] if the write does not fit.
    pub fn put_slice(&mut self, bytes: &[u8]) -> Result<(), PoolError> {
        let attempted = self.len() + bytes.len();
        if attempted > self.capacity() {
            return Err(PoolError::Overflow {
                attempted,
                capacity: self.capacity(),
            });
        }
        self.slot.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Convert into an immutable, reference-counted view.
    ///
    /// Slices of the returned [`Bytes`] keep the pool slot alive; it is
    /// returned once every view is gone.
    #[must_use]
    pub fn freeze(self) -> Bytes { Bytes::from_owner(self.slot) }
}

impl fmt::Debug for PacketBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuf")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::{PacketPool, PoolError};

    #[fixture]
    fn pool() -> PacketPool { PacketPool::new(2, 16).expect("valid pool") }

    #[rstest]
    fn alloc_and_drop_return_buffers(pool: PacketPool) {
        let first = pool.alloc().expect("first buffer");
        let second = pool.alloc().expect("second buffer");
        assert_eq!(pool.in_use(), 2);
        assert_eq!(
            pool.alloc().expect_err("pool should be empty"),
            PoolError::Exhausted { capacity: 2 }
        );
        assert_eq!(pool.alloc_failures(), 1);

        drop(first);
        assert_eq!(pool.available(), 1);
        drop(second);
        assert_eq!(pool.available(), 2);
    }

    #[rstest]
    fn writes_are_bounded_by_buffer_size(pool: PacketPool) {
        let mut buf = pool.alloc().expect("buffer");
        buf.put_slice(&[1; 10]).expect("fits");
        assert_eq!(buf.remaining(), 6);
        assert_eq!(
            buf.put_slice(&[2; 7]),
            Err(PoolError::Overflow {
                attempted: 17,
                capacity: 16
            })
        );
        assert_eq!(buf.len(), 10);
    }

    #[rstest]
    fn frozen_views_hold_the_slot_until_the_last_drops(pool: PacketPool) {
        let mut buf = pool.alloc().expect("buffer");
        buf.put_slice(b"abcdefgh").expect("fits");
        let whole = buf.freeze();
        let head = whole.slice(..4);
        let tail = whole.slice(4..);
        drop(whole);

        assert_eq!(pool.in_use(), 1);
        assert_eq!(&head[..], b"abcd");
        drop(head);
        assert_eq!(pool.in_use(), 1);
        assert_eq!(&tail[..], b"efgh");
        drop(tail);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn recycled_buffers_start_empty() {
        let pool = PacketPool::new(1, 8).expect("valid pool");
        let mut buf = pool.alloc().expect("buffer");
        buf.put_slice(b"dirty").expect("fits");
        drop(buf);
        assert!(pool.alloc().expect("recycled").is_empty());
    }

    #[test]
    fn zero_geometry_is_rejected() {
        assert!(matches!(
            PacketPool::new(0, 8),
            Err(PoolError::InvalidGeometry { .. })
        ));
    }
}
