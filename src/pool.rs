//! Reusable byte-buffer pool with scoped checkout.
//!
//! The encoder borrows a scratch buffer per call and the buffer must find
//! its way back on every exit path, including error returns. [`PooledBuf`]
//! guarantees that by releasing in `Drop`.
//!
//! # Design
//!
//! - Power-of-two buckets from 256 bytes to 1 MiB; `acquire` rounds the
//!   requested size up to the next bucket, so the returned buffer is always
//!   at least as large as requested.
//! - `acquire` never waits for capacity: an empty bucket allocates fresh.
//! - Buckets are `Mutex`-guarded and bounded, so concurrent checkout and
//!   release are safe and the pool cannot grow without limit.
//!
//! # Example
//!
//! ```
//! use hubwire::BufferPool;
//!
//! let pool = BufferPool::new();
//! let mut buf = pool.acquire(100);
//! assert!(buf.capacity() >= 100);
//! buf.extend_from_slice(b"scratch");
//! // releases back to the pool on drop
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;

/// Smallest bucket size in bytes.
pub const MIN_BUCKET_SIZE: usize = 256;

/// Largest pooled buffer size; larger checkouts are allocated fresh and
/// dropped on release.
pub const MAX_BUCKET_SIZE: usize = 1 << 20;

/// Maximum buffers retained per bucket.
pub const MAX_BUFFERS_PER_BUCKET: usize = 16;

// 256 << 12 == 1 MiB
const BUCKET_COUNT: usize = 13;

struct Shared {
    buckets: Vec<Mutex<Vec<BytesMut>>>,
}

/// Thread-safe pool of reusable `BytesMut` buffers.
///
/// Cloning is cheap and clones share the same buckets.
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<Shared>,
}

impl BufferPool {
    /// Create a new pool with empty buckets.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                buckets: (0..BUCKET_COUNT).map(|_| Mutex::new(Vec::new())).collect(),
            }),
        }
    }

    /// Check out a cleared buffer with capacity of at least `min_size`.
    ///
    /// Never blocks waiting for a buffer: an empty bucket allocates fresh,
    /// and requests beyond [`MAX_BUCKET_SIZE`] bypass the pool entirely.
    pub fn acquire(&self, min_size: usize) -> PooledBuf {
        let buf = match bucket_for_request(min_size) {
            Some(idx) => {
                let mut bucket = self.shared.buckets[idx]
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                bucket
                    .pop()
                    .unwrap_or_else(|| BytesMut::with_capacity(MIN_BUCKET_SIZE << idx))
            }
            None => BytesMut::with_capacity(min_size),
        };
        PooledBuf {
            buf: Some(buf),
            pool: self.clone(),
        }
    }

    fn release(&self, mut buf: BytesMut) {
        buf.clear();
        let Some(idx) = bucket_for_release(buf.capacity()) else {
            return;
        };
        let mut bucket = self.shared.buckets[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if bucket.len() < MAX_BUFFERS_PER_BUCKET {
            bucket.push(buf);
        }
    }

    #[cfg(test)]
    fn pooled_count(&self, idx: usize) -> usize {
        self.shared.buckets[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("buckets", &BUCKET_COUNT)
            .finish()
    }
}

/// Bucket index for an acquire request: round up to the next bucket.
fn bucket_for_request(min_size: usize) -> Option<usize> {
    let size = min_size.max(MIN_BUCKET_SIZE).next_power_of_two();
    if size > MAX_BUCKET_SIZE {
        return None;
    }
    Some((size.trailing_zeros() - MIN_BUCKET_SIZE.trailing_zeros()) as usize)
}

/// Bucket index for a released buffer: round capacity down, so every buffer
/// stored in a bucket has at least that bucket's nominal size.
fn bucket_for_release(capacity: usize) -> Option<usize> {
    if capacity < MIN_BUCKET_SIZE {
        return None;
    }
    let floor = usize::BITS - 1 - capacity.leading_zeros();
    let idx = (floor - MIN_BUCKET_SIZE.trailing_zeros()) as usize;
    if idx >= BUCKET_COUNT {
        return None;
    }
    Some(idx)
}

/// A buffer checked out of a [`BufferPool`].
///
/// Dereferences to `BytesMut`; returns to the pool when dropped.
pub struct PooledBuf {
    buf: Option<BytesMut>,
    pool: BufferPool,
}

impl Deref for PooledBuf {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        self.buf.as_ref().expect("buffer present until drop")
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut BytesMut {
        self.buf.as_mut().expect("buffer present until drop")
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

impl fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuf")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_capacity_at_least_requested() {
        let pool = BufferPool::new();
        for size in [0, 1, 255, 256, 257, 1000, 4096, 100_000] {
            let buf = pool.acquire(size);
            assert!(buf.capacity() >= size, "requested {size}");
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_release_and_reuse() {
        let pool = BufferPool::new();

        let mut buf = pool.acquire(512);
        buf.extend_from_slice(b"dirty");
        drop(buf);
        assert_eq!(pool.pooled_count(1), 1);

        // Reacquired buffer comes back cleared
        let buf = pool.acquire(512);
        assert!(buf.is_empty());
        assert_eq!(pool.pooled_count(1), 0);
    }

    #[test]
    fn test_release_on_early_drop_path() {
        let pool = BufferPool::new();
        {
            let _buf = pool.acquire(256);
            // simulated error return: guard drops here
        }
        assert_eq!(pool.pooled_count(0), 1);
    }

    #[test]
    fn test_bucket_rounding() {
        assert_eq!(bucket_for_request(1), Some(0));
        assert_eq!(bucket_for_request(256), Some(0));
        assert_eq!(bucket_for_request(257), Some(1));
        assert_eq!(bucket_for_request(1 << 20), Some(12));
        assert_eq!(bucket_for_request((1 << 20) + 1), None);

        assert_eq!(bucket_for_release(255), None);
        assert_eq!(bucket_for_release(256), Some(0));
        assert_eq!(bucket_for_release(511), Some(0));
        assert_eq!(bucket_for_release(512), Some(1));
        assert_eq!(bucket_for_release(1 << 21), None);
    }

    #[test]
    fn test_oversized_buffers_not_pooled() {
        let pool = BufferPool::new();
        let buf = pool.acquire((1 << 20) + 1);
        assert!(buf.capacity() > 1 << 20);
        drop(buf);
        for idx in 0..BUCKET_COUNT {
            assert_eq!(pool.pooled_count(idx), 0);
        }
    }

    #[test]
    fn test_bucket_retention_bounded() {
        let pool = BufferPool::new();
        let bufs: Vec<_> = (0..MAX_BUFFERS_PER_BUCKET + 4)
            .map(|_| pool.acquire(256))
            .collect();
        drop(bufs);
        assert_eq!(pool.pooled_count(0), MAX_BUFFERS_PER_BUCKET);
    }

    #[test]
    fn test_concurrent_checkout_release() {
        use std::thread;

        let pool = BufferPool::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        let mut buf = pool.acquire(1024);
                        buf.extend_from_slice(&[0xAB; 64]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
