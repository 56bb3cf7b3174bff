//! Null sink - discards all bytes
//!
//! Used to measure the access-log pipeline without disk I/O: rendering,
//! pooling and draining all run, the bytes are only counted.
//!
//! # Example
//!
//! ```ignore
//! use alog_sinks::NullSink;
//!
//! let sink = NullSink::new();
//! let handle = sink.handle();
//! // hand `sink` to the access log, read `handle` afterwards
//! println!("{} bytes", handle.bytes_written());
//! ```

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::sink::AccessLogSink;

/// Counters shared between a null sink and its handles
#[derive(Debug, Default)]
struct NullCounters {
    writes: AtomicU64,
    bytes: AtomicU64,
    flushes: AtomicU64,
}

/// Sink that discards everything it receives
#[derive(Debug, Default)]
pub struct NullSink {
    counters: Arc<NullCounters>,
}

/// Read-only view of a null sink's counters
///
/// Stays valid after the sink itself was moved into the writer task.
#[derive(Debug, Clone)]
pub struct NullSinkHandle {
    counters: Arc<NullCounters>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for reading the counters later
    pub fn handle(&self) -> NullSinkHandle {
        NullSinkHandle {
            counters: Arc::clone(&self.counters),
        }
    }
}

impl NullSinkHandle {
    #[inline]
    pub fn writes(&self) -> u64 {
        self.counters.writes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.counters.bytes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn flushes(&self) -> u64 {
        self.counters.flushes.load(Ordering::Relaxed)
    }
}

impl AccessLogSink for NullSink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn rollover(&mut self) -> io::Result<bool> {
        Ok(false)
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}
