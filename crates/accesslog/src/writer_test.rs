//! Tests for the writer task

use super::*;
use crate::buffer_pool::BufferPool;
use alog_sinks::MemorySink;

fn config() -> WriterConfig {
    WriterConfig {
        auto_flush: false,
        auto_flush_interval: Duration::from_secs(60),
        drain_interval: Duration::from_millis(10),
        max_write_retries: DEFAULT_WRITE_RETRIES,
        retry_delay: Duration::from_millis(1),
        error_log_interval: Duration::from_secs(10),
    }
}

struct Harness {
    pool: BufferPool,
    queue: Arc<DispatchQueue>,
    metrics: Arc<AccessLogMetrics>,
    sink: MemorySink,
}

impl Harness {
    fn new() -> Self {
        Self {
            pool: BufferPool::new(16, 128),
            queue: Arc::new(DispatchQueue::new(32, false)),
            metrics: Arc::new(AccessLogMetrics::default()),
            sink: MemorySink::new(),
        }
    }

    fn writer(&self, config: WriterConfig) -> Writer {
        Writer::new(
            Box::new(self.sink.clone()),
            Arc::clone(&self.queue),
            Arc::clone(&self.metrics),
            config,
        )
    }

    fn push(&self, line: &str) {
        let mut buf = self.pool.allocate();
        buf.as_mut_slice()[..line.len()].copy_from_slice(line.as_bytes());
        buf.set_len(line.len());
        self.queue.enqueue(buf);
    }
}

// =============================================================================
// Drain
// =============================================================================

#[tokio::test]
async fn test_drain_writes_in_order_and_frees() {
    let h = Harness::new();
    let mut writer = h.writer(config());

    for i in 0..10 {
        h.push(&format!("line {i}\n"));
    }
    assert_eq!(h.pool.in_flight(), 10);

    assert_eq!(writer.drain().await, 10);

    let expected: Vec<String> = (0..10).map(|i| format!("line {i}")).collect();
    assert_eq!(h.sink.lines(), expected);
    assert_eq!(h.pool.in_flight(), 0);
    assert_eq!(h.queue.pending(), 0);
    assert_eq!(h.sink.rollover_checks(), 1);

    let written = h.metrics.buffers_written.load(std::sync::atomic::Ordering::Relaxed);
    assert_eq!(written, 10);
}

#[tokio::test]
async fn test_empty_drain_touches_nothing() {
    let h = Harness::new();
    let mut writer = h.writer(config());

    assert_eq!(writer.drain().await, 0);
    assert_eq!(h.sink.rollover_checks(), 0);
    assert_eq!(h.sink.flush_count(), 0);
}

#[tokio::test]
async fn test_auto_flush_flushes_every_drain() {
    let h = Harness::new();
    let mut writer = h.writer(WriterConfig {
        auto_flush: true,
        ..config()
    });

    h.push("a\n");
    writer.drain().await;
    h.push("b\n");
    writer.drain().await;

    assert_eq!(h.sink.flush_count(), 2);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_write_retried_until_success() {
    let h = Harness::new();
    let mut writer = h.writer(config());
    h.sink.fail_next_writes(2);

    h.push("survives\n");
    writer.drain().await;

    assert_eq!(h.sink.lines(), vec!["survives"]);
    let snapshot = h.metrics.snapshot(Default::default(), Default::default());
    assert_eq!(snapshot.write_retries, 2);
    assert_eq!(snapshot.write_failures, 0);
}

#[tokio::test]
async fn test_write_dropped_after_retries_and_buffer_freed() {
    let h = Harness::new();
    let mut writer = h.writer(config());
    h.sink.fail_next_writes(3);

    h.push("lost\n");
    h.push("kept\n");
    writer.drain().await;

    // The first line used up all three attempts, the second went through
    assert_eq!(h.sink.lines(), vec!["kept"]);
    assert_eq!(h.pool.in_flight(), 0);
    assert_eq!(h.queue.pending(), 0);

    let snapshot = h.metrics.snapshot(Default::default(), Default::default());
    assert_eq!(snapshot.write_failures, 1);
    assert_eq!(snapshot.buffers_written, 1);
}

// =============================================================================
// Task loop
// =============================================================================

#[tokio::test]
async fn test_drain_ticker_picks_up_short_queue() {
    let h = Harness::new();
    let (_tx, rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(h.writer(config()).run(rx, cancel.clone()));

    // Below the wake threshold, so only the ticker can drain it
    h.push("tick\n");
    for _ in 0..100 {
        if h.queue.pending() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.sink.lines(), vec!["tick"]);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_flush_command_replies_after_flush() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(
        h.writer(WriterConfig {
            drain_interval: Duration::from_secs(3600),
            ..config()
        })
        .run(rx, cancel.clone()),
    );

    h.push("flushed\n");
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(WriterCommand::Flush(reply_tx)).await.unwrap();
    reply_rx.await.unwrap();

    assert_eq!(h.sink.lines(), vec!["flushed"]);
    assert!(h.sink.flush_count() >= 1);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_cancel_drains_flushes_and_closes() {
    let h = Harness::new();
    let (_tx, rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    let writer = h.writer(WriterConfig {
        drain_interval: Duration::from_secs(3600),
        ..config()
    });

    for i in 0..5 {
        h.push(&format!("{i}\n"));
    }
    cancel.cancel();
    writer.run(rx, cancel).await;

    assert_eq!(h.sink.lines(), vec!["0", "1", "2", "3", "4"]);
    assert!(h.sink.flush_count() >= 1);
    assert!(h.sink.is_closed());
    assert_eq!(h.pool.in_flight(), 0);
}

#[tokio::test]
async fn test_dropped_command_sender_stops_writer() {
    let h = Harness::new();
    let (tx, rx) = mpsc::channel(4);
    let task = tokio::spawn(h.writer(config()).run(rx, CancellationToken::new()));

    drop(tx);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(h.sink.is_closed());
}
