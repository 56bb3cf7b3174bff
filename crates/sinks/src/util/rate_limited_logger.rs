//! Rate-limited error logging
//!
//! A failing disk produces one error per drained buffer, which under load is
//! thousands per second. This logger emits at most one line per interval and
//! reports how many errors were folded into it.
//!
//! # Example
//!
//! ```ignore
//! use alog_sinks::RateLimitedLogger;
//! use std::time::Duration;
//!
//! let logger = RateLimitedLogger::new(Duration::from_secs(10));
//! for _ in 0..1000 {
//!     logger.error("sink write failed", &io_error);
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default interval between emitted lines
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Rate-limited error logger
///
/// Thread-safe: counters are atomics, the last emission time sits behind a
/// mutex that is held only for the comparison.
pub struct RateLimitedLogger {
    min_interval: Duration,
    last_emit: Mutex<Option<Instant>>,

    /// Errors since the last emitted line
    pending: AtomicU64,

    /// Errors ever recorded
    total: AtomicU64,
}

impl RateLimitedLogger {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emit: Mutex::new(None),
            pending: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Record an error, logging it if the interval has elapsed
    ///
    /// Returns true if a line was emitted.
    pub fn error(&self, message: &str, error: &dyn std::fmt::Display) -> bool {
        self.pending.fetch_add(1, Ordering::Relaxed);
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;

        if !self.try_claim_slot() {
            return false;
        }

        let folded = self.pending.swap(0, Ordering::Relaxed);
        if folded > 1 {
            tracing::error!(
                message = %message,
                error = %error,
                suppressed = folded - 1,
                total_errors = total,
                "error (rate-limited)"
            );
        } else {
            tracing::error!(message = %message, error = %error, total_errors = total, "error");
        }
        true
    }

    fn try_claim_slot(&self) -> bool {
        let mut last = self.last_emit.lock();
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Errors recorded since the last emitted line
    pub fn pending_error_count(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }

    /// Errors ever recorded
    pub fn total_error_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl Default for RateLimitedLogger {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}
