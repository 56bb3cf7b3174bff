//! Access log facade
//!
//! Owns the compiled format, the buffer pool, the dispatch queue and the
//! writer task. Request threads call `log`; everything after the enqueue
//! happens on the writer.
//!
//! # Example
//!
//! ```ignore
//! let log = AccessLog::start(AccessLogConfig::default(), sink)?;
//!
//! // On a request thread (never an async task on the writer's runtime)
//! log.log(&exchange)?;
//!
//! let metrics = log.shutdown().await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use alog_sinks::AccessLogSink;
use alog_sinks::util::DEFAULT_LOG_INTERVAL;
use parking_lot::Mutex;
use regex::bytes::Regex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::buffer_pool::{BufferPool, DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY};
use crate::error::AccessLogError;
use crate::exchange::{HttpExchange, HostResolver};
use crate::format::DEFAULT_FORMAT;
use crate::metrics::{AccessLogMetrics, MetricsSnapshot};
use crate::queue::{DEFAULT_WAKE_THRESHOLD, DispatchQueue};
use crate::render::Renderer;
use crate::time_cache::{DEFAULT_TIME_FORMAT, LogTimeZone};
use crate::writer::{DEFAULT_RETRY_DELAY, DEFAULT_WRITE_RETRIES, Writer, WriterCommand, WriterConfig};

/// Smallest buffer a line can be rendered into
pub const MIN_BUFFER_SIZE: usize = 1024;

const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct AccessLogConfig {
    /// Apache-style format string
    pub format: String,

    /// strftime pattern for `%t`
    pub time_format: String,

    pub time_zone: LogTimeZone,

    /// Flush the sink after every drain and wake the writer on every enqueue
    pub auto_flush: bool,

    /// Periodic sink flush
    pub auto_flush_interval: Duration,

    /// Drain period for queues below the wake threshold
    pub drain_interval: Duration,

    /// Buffers that may be in flight at once
    pub pool_capacity: usize,

    /// Bytes per buffer (longest line)
    pub buffer_size: usize,

    /// Regexes matched against the raw request URI; a match skips the request
    pub excludes: Vec<String>,

    /// Render `%h` through the host resolver
    pub hostname_lookup: bool,

    /// Queue length that wakes the writer early
    pub wake_threshold: usize,

    pub flush_timeout: Duration,
    pub shutdown_timeout: Duration,

    /// Attempts per buffer before it is dropped
    pub max_write_retries: usize,
    pub retry_delay: Duration,

    /// Minimum gap between repeated sink error logs
    pub error_log_interval: Duration,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_FORMAT.to_string(),
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            time_zone: LogTimeZone::Local,
            auto_flush: false,
            auto_flush_interval: Duration::from_secs(60),
            drain_interval: Duration::from_millis(100),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            buffer_size: DEFAULT_BUFFER_SIZE,
            excludes: Vec::new(),
            hostname_lookup: false,
            wake_threshold: DEFAULT_WAKE_THRESHOLD,
            flush_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            max_write_retries: DEFAULT_WRITE_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            error_log_interval: DEFAULT_LOG_INTERVAL,
        }
    }
}

impl AccessLogConfig {
    fn validate(&self) -> Result<(), AccessLogError> {
        if self.pool_capacity == 0 {
            return Err(AccessLogError::config("pool_capacity must be at least 1"));
        }
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(AccessLogError::config(format!(
                "buffer_size must be at least {MIN_BUFFER_SIZE} bytes"
            )));
        }
        if self.drain_interval.is_zero() {
            return Err(AccessLogError::config("drain_interval must be non-zero"));
        }
        if self.auto_flush_interval.is_zero() {
            return Err(AccessLogError::config("auto_flush_interval must be non-zero"));
        }
        Ok(())
    }
}

/// A running access log
pub struct AccessLog {
    renderer: Renderer,
    excludes: Box<[Regex]>,
    pool: BufferPool,
    queue: Arc<DispatchQueue>,
    metrics: Arc<AccessLogMetrics>,

    commands: mpsc::Sender<WriterCommand>,
    cancel: CancellationToken,
    writer: Mutex<Option<JoinHandle<()>>>,

    /// Cleared by `shutdown`; `log` refuses new lines afterwards
    active: AtomicBool,

    flush_timeout: Duration,
    shutdown_timeout: Duration,
}

impl AccessLog {
    /// Compile the configuration and spawn the writer on the current runtime
    pub fn start(
        config: AccessLogConfig,
        sink: impl AccessLogSink + 'static,
    ) -> Result<Self, AccessLogError> {
        Self::start_inner(config, Box::new(sink), None)
    }

    /// Like `start`, resolving `%h` through `resolver` when hostname lookup
    /// is enabled
    pub fn start_with_resolver(
        config: AccessLogConfig,
        sink: impl AccessLogSink + 'static,
        resolver: Arc<dyn HostResolver>,
    ) -> Result<Self, AccessLogError> {
        Self::start_inner(config, Box::new(sink), Some(resolver))
    }

    fn start_inner(
        config: AccessLogConfig,
        sink: Box<dyn AccessLogSink>,
        resolver: Option<Arc<dyn HostResolver>>,
    ) -> Result<Self, AccessLogError> {
        let runtime = Handle::try_current().map_err(|_| AccessLogError::NoRuntime)?;
        config.validate()?;

        let mut renderer = Renderer::compile(&config.format, &config.time_format, config.time_zone)?;
        if config.hostname_lookup
            && let Some(resolver) = resolver
        {
            renderer = renderer.with_resolver(resolver);
        }

        let excludes = config
            .excludes
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| AccessLogError::Exclude {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pool = BufferPool::new(config.pool_capacity, config.buffer_size);
        let queue = Arc::new(DispatchQueue::new(config.wake_threshold, config.auto_flush));
        let metrics = Arc::new(AccessLogMetrics::default());
        let (commands, command_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let writer = Writer::new(
            sink,
            Arc::clone(&queue),
            Arc::clone(&metrics),
            WriterConfig {
                auto_flush: config.auto_flush,
                auto_flush_interval: config.auto_flush_interval,
                drain_interval: config.drain_interval,
                max_write_retries: config.max_write_retries,
                retry_delay: config.retry_delay,
                error_log_interval: config.error_log_interval,
            },
        );
        let handle = runtime.spawn(writer.run(command_rx, cancel.clone()));

        tracing::info!(
            format = %config.format,
            pool_capacity = config.pool_capacity,
            buffer_size = config.buffer_size,
            excludes = excludes.len(),
            auto_flush = config.auto_flush,
            "access log started"
        );

        Ok(Self {
            renderer,
            excludes: excludes.into_boxed_slice(),
            pool,
            queue,
            metrics,
            commands,
            cancel,
            writer: Mutex::new(Some(handle)),
            active: AtomicBool::new(true),
            flush_timeout: config.flush_timeout,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// Log `exchange` as finished now
    ///
    /// Returns `Ok(false)` when an exclude pattern skipped it. Blocks while
    /// every buffer is in flight.
    pub fn log<E: HttpExchange + ?Sized>(&self, exchange: &E) -> Result<bool, AccessLogError> {
        self.log_at(exchange, SystemTime::now())
    }

    /// Log `exchange` as finished at `now`
    pub fn log_at<E: HttpExchange + ?Sized>(
        &self,
        exchange: &E,
        now: SystemTime,
    ) -> Result<bool, AccessLogError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(AccessLogError::Closed);
        }

        if !self.excludes.is_empty() {
            let uri = exchange.raw_uri();
            if self.excludes.iter().any(|re| re.is_match(uri)) {
                self.metrics.record_excluded();
                return Ok(false);
            }
        }

        let mut buffer = self.pool.allocate();
        // Shutdown may have started while this thread waited for a buffer
        if !self.active.load(Ordering::Acquire) {
            return Err(AccessLogError::Closed);
        }
        let len = self.renderer.render(exchange, now, buffer.as_mut_slice(), 0);
        buffer.set_len(len);

        self.queue.enqueue(buffer);
        self.metrics.record_logged();
        Ok(true)
    }

    /// Drain, flush and check rollover, waiting for the writer to finish
    pub async fn flush(&self) -> Result<(), AccessLogError> {
        let (reply, done) = oneshot::channel();
        self.commands
            .send(WriterCommand::Flush(reply))
            .await
            .map_err(|_| AccessLogError::Closed)?;

        match tokio::time::timeout(self.flush_timeout, done).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(AccessLogError::Closed),
            Err(_) => Err(AccessLogError::Timeout("flush")),
        }
    }

    /// Wait until every enqueued line has been written, up to `timeout`
    ///
    /// Returns whether the pipeline was observed empty.
    pub async fn wait_for_flush(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.queue.pending() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            self.queue.wake();
            tokio::time::sleep(FLUSH_POLL_INTERVAL).await;
        }
    }

    /// Stop accepting lines, write what is queued and close the sink
    ///
    /// Calling it again returns the final metrics without doing anything.
    pub async fn shutdown(&self) -> Result<MetricsSnapshot, AccessLogError> {
        self.active.store(false, Ordering::Release);

        let handle = self.writer.lock().take();
        let Some(handle) = handle else {
            return Ok(self.metrics());
        };

        self.queue.wake();
        if !self.wait_for_flush(self.shutdown_timeout).await {
            tracing::warn!(
                pending = self.queue.pending(),
                timeout = ?self.shutdown_timeout,
                "access log still pending at shutdown"
            );
        }

        self.cancel.cancel();
        handle.await?;

        self.drop_leftovers();

        let metrics = self.metrics();
        tracing::info!(
            logged = metrics.logged,
            excluded = metrics.excluded,
            written = metrics.buffers_written,
            bytes = metrics.bytes_written,
            failures = metrics.write_failures,
            dropped = metrics.dropped,
            "access log shut down"
        );
        Ok(metrics)
    }

    /// Release buffers enqueued after the writer's final drain
    ///
    /// A producer that passed the active check just before shutdown can
    /// still get there.
    fn drop_leftovers(&self) -> usize {
        let leftover = self.queue.drain_all();
        let n = leftover.len();
        if n > 0 {
            drop(leftover);
            self.queue.mark_written(n);
            self.metrics.record_dropped(n);
            tracing::warn!(dropped = n, "access log lines enqueued after final drain");
        }
        n
    }

    /// Current counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics
            .snapshot(self.pool.metrics().snapshot(), self.renderer.time_cache().stats())
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for AccessLog {
    fn drop(&mut self) {
        // The writer still drains and closes the sink on its own
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[path = "access_log_test.rs"]
mod access_log_test;
