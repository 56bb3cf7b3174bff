//! FIFO of filled buffers between producers and the writer
//!
//! Producers append under a short lock; the writer swaps the whole queue out
//! under the same lock and writes it without holding anything. Append order
//! is write order.

use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;

use crate::buffer_pool::LogBuffer;

/// Queue length above which an enqueue wakes the writer
pub const DEFAULT_WAKE_THRESHOLD: usize = 32;

#[derive(Debug)]
pub struct DispatchQueue {
    items: Mutex<VecDeque<LogBuffer>>,

    /// Length as of the last lock holder
    approx_len: AtomicUsize,

    /// Enqueued and not yet written
    pending: AtomicUsize,

    wake: Notify,
    wake_threshold: usize,

    /// Wake on every enqueue
    eager: bool,
}

impl DispatchQueue {
    pub fn new(wake_threshold: usize, eager: bool) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            approx_len: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            wake: Notify::new(),
            wake_threshold,
            eager,
        }
    }

    /// Append a filled buffer, waking the writer when the queue is long
    pub fn enqueue(&self, buffer: LogBuffer) {
        let len = {
            let mut items = self.items.lock();
            items.push_back(buffer);
            // Counted under the lock so a drain never sees the buffer first
            self.pending.fetch_add(1, Ordering::AcqRel);
            let len = items.len();
            self.approx_len.store(len, Ordering::Relaxed);
            len
        };

        if self.eager || len > self.wake_threshold {
            self.wake.notify_one();
        }
    }

    /// Detach everything queued so far
    pub fn drain_all(&self) -> VecDeque<LogBuffer> {
        let mut items = self.items.lock();
        self.approx_len.store(0, Ordering::Relaxed);
        mem::take(&mut *items)
    }

    /// Record `n` drained buffers as written
    pub fn mark_written(&self, n: usize) {
        self.pending.fetch_sub(n, Ordering::AcqRel);
    }

    /// Wake the writer regardless of length
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Future resolved by the next wake
    pub fn notified(&self) -> Notified<'_> {
        self.wake.notified()
    }

    /// Approximate queued count (read without the lock)
    pub fn len(&self) -> usize {
        self.approx_len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffers enqueued but not yet written to the sink
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;
