//! Bounded pool of fixed-size line buffers
//!
//! Each request renders into a `LogBuffer` taken from the pool. The pool
//! holds at most `capacity` buffers in flight; once they are all out,
//! `allocate` blocks the calling thread until the writer frees one. Logging
//! slows the producers down instead of growing memory or dropping lines.
//!
//! A `LogBuffer` value is the permit: dropping it (after a write, on an
//! error path, or while unwinding) returns its storage to the free list and
//! wakes one waiting producer.
//!
//! # Example
//!
//! ```
//! use alog_accesslog::BufferPool;
//!
//! let pool = BufferPool::new(4, 1024);
//! let mut buf = pool.allocate();
//! buf.as_mut_slice()[..3].copy_from_slice(b"GET");
//! buf.set_len(3);
//! assert_eq!(buf.as_bytes(), b"GET");
//! drop(buf);
//! assert_eq!(pool.in_flight(), 0);
//! ```

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam::queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};

/// Default bytes per buffer (longest renderable line)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default maximum buffers in flight
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// Counters for pool monitoring
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// Buffers handed out
    pub allocations: AtomicU64,
    /// Allocations served from the free list
    pub reuses: AtomicU64,
    /// Allocations that had to create a buffer
    pub constructions: AtomicU64,
    /// Buffers returned
    pub frees: AtomicU64,
    /// Allocations that had to wait for a free buffer
    pub waits: AtomicU64,
    /// Highest number of buffers out at once
    pub peak_in_flight: AtomicU64,
}

impl PoolMetrics {
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            constructions: self.constructions.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of pool metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetricsSnapshot {
    pub allocations: u64,
    pub reuses: u64,
    pub constructions: u64,
    pub frees: u64,
    pub waits: u64,
    pub peak_in_flight: u64,
}

impl PoolMetricsSnapshot {
    /// Share of allocations served from the free list (0.0 to 1.0)
    pub fn reuse_rate(&self) -> f64 {
        if self.allocations == 0 {
            1.0
        } else {
            self.reuses as f64 / self.allocations as f64
        }
    }
}

struct PoolInner {
    /// Storage of returned buffers
    free: ArrayQueue<Box<[u8]>>,

    /// Permits left; `capacity - permits` buffers are out
    permits: Mutex<usize>,
    released: Condvar,

    capacity: usize,
    buffer_size: usize,
    metrics: PoolMetrics,
}

impl PoolInner {
    /// Take a permit while holding the lock
    fn grant(&self, permits: &mut usize) {
        *permits -= 1;
        let in_flight = (self.capacity - *permits) as u64;
        self.metrics.peak_in_flight.fetch_max(in_flight, Ordering::Relaxed);
    }

    fn storage(self: &Arc<Self>) -> LogBuffer {
        self.metrics.allocations.fetch_add(1, Ordering::Relaxed);
        let data = match self.free.pop() {
            Some(data) => {
                self.metrics.reuses.fetch_add(1, Ordering::Relaxed);
                data
            }
            None => {
                self.metrics.constructions.fetch_add(1, Ordering::Relaxed);
                vec![0u8; self.buffer_size].into_boxed_slice()
            }
        };

        LogBuffer {
            data,
            len: 0,
            pool: Arc::clone(self),
        }
    }

    fn release(&self, data: Box<[u8]>) {
        self.metrics.frees.fetch_add(1, Ordering::Relaxed);
        if data.len() == self.buffer_size {
            // Never more buffers than permits, so the push cannot fail
            let _ = self.free.push(data);
        }

        let mut permits = self.permits.lock();
        *permits += 1;
        drop(permits);
        self.released.notify_one();
    }
}

/// Fixed-capacity pool of reusable line buffers
///
/// Cheap to clone; clones share the same buffers and permits.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Pool of at most `capacity` buffers of `buffer_size` bytes each
    ///
    /// Buffers are created lazily on first use. A zero capacity is raised
    /// to one.
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(PoolInner {
                free: ArrayQueue::new(capacity),
                permits: Mutex::new(capacity),
                released: Condvar::new(),
                capacity,
                buffer_size,
                metrics: PoolMetrics::default(),
            }),
        }
    }

    /// Take a buffer, blocking while all of them are in flight
    pub fn allocate(&self) -> LogBuffer {
        let mut permits = self.inner.permits.lock();
        if *permits == 0 {
            self.inner.metrics.waits.fetch_add(1, Ordering::Relaxed);
            while *permits == 0 {
                self.inner.released.wait(&mut permits);
            }
        }
        self.inner.grant(&mut permits);
        drop(permits);

        self.inner.storage()
    }

    /// Take a buffer if one is available right now
    pub fn try_allocate(&self) -> Option<LogBuffer> {
        let mut permits = self.inner.permits.lock();
        if *permits == 0 {
            return None;
        }
        self.inner.grant(&mut permits);
        drop(permits);

        Some(self.inner.storage())
    }

    /// Take a buffer, waiting at most `timeout`
    pub fn allocate_timeout(&self, timeout: Duration) -> Option<LogBuffer> {
        let deadline = Instant::now() + timeout;
        let mut permits = self.inner.permits.lock();
        if *permits == 0 {
            self.inner.metrics.waits.fetch_add(1, Ordering::Relaxed);
            while *permits == 0 {
                if self.inner.released.wait_until(&mut permits, deadline).timed_out() && *permits == 0 {
                    return None;
                }
            }
        }
        self.inner.grant(&mut permits);
        drop(permits);

        Some(self.inner.storage())
    }

    /// Return a buffer; same as dropping it
    pub fn free(&self, buffer: LogBuffer) {
        drop(buffer);
    }

    /// Buffers currently out of the pool
    pub fn in_flight(&self) -> usize {
        self.inner.capacity - *self.inner.permits.lock()
    }

    /// Permits left before `allocate` blocks
    pub fn available(&self) -> usize {
        *self.inner.permits.lock()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.inner.metrics
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.inner.capacity)
            .field("buffer_size", &self.inner.buffer_size)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// A pooled line buffer with a fill length
///
/// Returned to its pool on drop.
pub struct LogBuffer {
    data: Box<[u8]>,
    len: usize,
    pool: Arc<PoolInner>,
}

impl LogBuffer {
    /// Whole storage, for rendering into
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Filled part
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Set the fill length (clamped to the capacity)
    #[inline]
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.data.len());
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl AsRef<[u8]> for LogBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBuffer")
            .field("len", &self.len)
            .field("capacity", &self.data.len())
            .finish()
    }
}

impl Drop for LogBuffer {
    fn drop(&mut self) {
        let data = mem::take(&mut self.data);
        self.pool.release(data);
    }
}

#[cfg(test)]
#[path = "buffer_pool_test.rs"]
mod buffer_pool_test;
