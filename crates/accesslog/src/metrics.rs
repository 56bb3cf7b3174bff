//! Pipeline counters
//!
//! Producers and the writer bump relaxed atomics; `snapshot` reads them
//! together with the pool and time cache counters.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::buffer_pool::PoolMetricsSnapshot;
use crate::time_cache::TimeCacheStats;

/// Live pipeline counters
#[derive(Debug, Default)]
pub struct AccessLogMetrics {
    /// Lines rendered and queued
    pub logged: AtomicU64,
    /// Requests skipped by an exclude pattern
    pub excluded: AtomicU64,
    /// Buffers written to the sink
    pub buffers_written: AtomicU64,
    pub bytes_written: AtomicU64,
    /// Buffers lost after all retries
    pub write_failures: AtomicU64,
    pub write_retries: AtomicU64,
    /// Non-empty drain cycles
    pub drains: AtomicU64,
    pub flushes: AtomicU64,
    pub flush_failures: AtomicU64,
    /// Rollovers the sink reported
    pub rollovers: AtomicU64,
    /// Lines enqueued after the writer's final drain
    pub dropped: AtomicU64,
}

impl AccessLogMetrics {
    #[inline]
    pub fn record_logged(&self) {
        self.logged.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_excluded(&self) {
        self.excluded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_written(&self, bytes: usize) {
        self.buffers_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_write_retry(&self) {
        self.write_retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_drain(&self) {
        self.drains.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_flush(&self, ok: bool) {
        if ok {
            self.flushes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.flush_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_rollover(&self) {
        self.rollovers.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self, n: usize) {
        self.dropped.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, pool: PoolMetricsSnapshot, time: TimeCacheStats) -> MetricsSnapshot {
        MetricsSnapshot {
            logged: self.logged.load(Ordering::Relaxed),
            excluded: self.excluded.load(Ordering::Relaxed),
            buffers_written: self.buffers_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            write_retries: self.write_retries.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            rollovers: self.rollovers.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            pool,
            time,
        }
    }
}

/// Point-in-time view of the whole pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub logged: u64,
    pub excluded: u64,
    pub buffers_written: u64,
    pub bytes_written: u64,
    pub write_failures: u64,
    pub write_retries: u64,
    pub drains: u64,
    pub flushes: u64,
    pub flush_failures: u64,
    pub rollovers: u64,
    pub dropped: u64,
    pub pool: PoolMetricsSnapshot,
    pub time: TimeCacheStats,
}

impl MetricsSnapshot {
    /// Lines logged but not (yet) written, failed or dropped
    pub fn outstanding(&self) -> u64 {
        self.logged
            .saturating_sub(self.buffers_written + self.write_failures + self.dropped)
    }

    /// Average written line length in bytes
    pub fn avg_line_len(&self) -> f64 {
        if self.buffers_written == 0 {
            0.0
        } else {
            self.bytes_written as f64 / self.buffers_written as f64
        }
    }
}
