//! Background writer task
//!
//! The single consumer of the dispatch queue. It sleeps until one of:
//!
//! - a producer wakes it (queue past the threshold, or eager mode)
//! - the drain ticker fires, so short queues are not stranded
//! - the flush ticker fires
//! - a `Flush` command arrives from `AccessLog::flush`
//! - the cancellation token fires (shutdown)
//!
//! Each drain writes buffers in queue order, retries failed writes, frees
//! every buffer right after its write and asks the sink to roll over.
//! On shutdown it drains, flushes and closes the sink before returning.

use std::sync::Arc;
use std::time::Duration;

use alog_sinks::{AccessLogSink, RateLimitedLogger};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::metrics::AccessLogMetrics;
use crate::queue::DispatchQueue;

/// Default write attempts per buffer
pub const DEFAULT_WRITE_RETRIES: usize = 3;

/// Default pause between write attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Requests from the facade to the writer
#[derive(Debug)]
pub(crate) enum WriterCommand {
    /// Drain, flush and check rollover, then reply
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Clone)]
pub(crate) struct WriterConfig {
    pub auto_flush: bool,
    pub auto_flush_interval: Duration,
    pub drain_interval: Duration,
    pub max_write_retries: usize,
    pub retry_delay: Duration,
    pub error_log_interval: Duration,
}

pub(crate) struct Writer {
    sink: Box<dyn AccessLogSink>,
    queue: Arc<DispatchQueue>,
    metrics: Arc<AccessLogMetrics>,
    errors: RateLimitedLogger,
    config: WriterConfig,
}

impl Writer {
    pub(crate) fn new(
        sink: Box<dyn AccessLogSink>,
        queue: Arc<DispatchQueue>,
        metrics: Arc<AccessLogMetrics>,
        config: WriterConfig,
    ) -> Self {
        Self {
            sink,
            queue,
            metrics,
            errors: RateLimitedLogger::new(config.error_log_interval),
            config,
        }
    }

    /// Run until cancelled or until every command sender is gone
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<WriterCommand>,
        cancel: CancellationToken,
    ) {
        let mut drain_ticker = tokio::time::interval(self.config.drain_interval);
        drain_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let flush_every = self.config.auto_flush_interval;
        let mut flush_ticker = tokio::time::interval_at(Instant::now() + flush_every, flush_every);
        flush_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(sink = %self.sink.name(), "access log writer started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                command = commands.recv() => match command {
                    Some(WriterCommand::Flush(reply)) => {
                        self.drain().await;
                        self.flush();
                        self.rollover();
                        let _ = reply.send(());
                    }
                    None => break,
                },

                _ = self.queue.notified() => {
                    self.drain().await;
                }

                _ = drain_ticker.tick() => {
                    self.drain().await;
                }

                _ = flush_ticker.tick() => {
                    self.drain().await;
                    self.flush();
                }
            }
        }

        self.shutdown().await;
    }

    /// Write everything queued; returns the number of buffers drained
    pub(crate) async fn drain(&mut self) -> usize {
        let batch = self.queue.drain_all();
        if batch.is_empty() {
            return 0;
        }

        let count = batch.len();
        for buffer in batch {
            let len = buffer.len();
            if self.write_with_retry(buffer.as_bytes()).await {
                self.metrics.record_written(len);
            }
            // Back to the pool before the producer-visible count drops
            drop(buffer);
            self.queue.mark_written(1);
        }
        self.metrics.record_drain();

        if self.config.auto_flush {
            self.flush();
        }
        self.rollover();

        count
    }

    async fn write_with_retry(&mut self, bytes: &[u8]) -> bool {
        let attempts = self.config.max_write_retries.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            match self.sink.write(bytes) {
                Ok(()) => return true,
                Err(e) => {
                    if attempt + 1 < attempts {
                        self.metrics.record_write_retry();
                        tracing::warn!(
                            sink = %self.sink.name(),
                            attempt = attempt + 1,
                            max_attempts = attempts,
                            error = %e,
                            "access log write failed, retrying"
                        );
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        self.metrics.record_write_failure();
        if let Some(e) = last_error {
            self.errors.error("access log write failed after all retries", &e);
        }
        false
    }

    fn flush(&mut self) {
        match self.sink.flush() {
            Ok(()) => self.metrics.record_flush(true),
            Err(e) => {
                self.metrics.record_flush(false);
                self.errors.error("access log flush failed", &e);
            }
        }
    }

    fn rollover(&mut self) {
        match self.sink.rollover() {
            Ok(true) => self.metrics.record_rollover(),
            Ok(false) => {}
            Err(e) => {
                self.errors.error("access log rollover failed", &e);
            }
        }
    }

    async fn shutdown(mut self) {
        // Producers may still be finishing a line; take what is there
        while self.drain().await > 0 {}
        self.flush();

        if let Err(e) = self.sink.close() {
            tracing::error!(sink = %self.sink.name(), error = %e, "failed to close access log sink");
        }

        tracing::debug!(
            sink = %self.sink.name(),
            errors = self.errors.total_error_count(),
            "access log writer finished"
        );
    }
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod writer_test;
