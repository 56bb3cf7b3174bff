//! Tests for the access log facade

use super::*;
use crate::error::FormatError;
use crate::exchange::{RecordedExchange, StaticHostResolver};
use alog_sinks::{MemorySink, RolloverPeriod, RotatingFileConfig, RotatingFileSink};
use std::net::{IpAddr, Ipv4Addr};
use std::time::UNIX_EPOCH;

/// 2010-01-15 10:30:45 UTC
const BASE: u64 = 1_263_551_445;

fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

fn utc_config() -> AccessLogConfig {
    AccessLogConfig {
        time_zone: LogTimeZone::utc(),
        ..Default::default()
    }
}

fn get(uri: &str) -> RecordedExchange {
    RecordedExchange::new("GET", uri).with_content_length(1234)
}

// =============================================================================
// Start
// =============================================================================

#[test]
fn test_start_outside_runtime() {
    let result = AccessLog::start(AccessLogConfig::default(), MemorySink::new());
    assert!(matches!(result, Err(AccessLogError::NoRuntime)));
}

#[tokio::test]
async fn test_start_rejects_bad_format() {
    let config = AccessLogConfig {
        format: "%h %{Referer".into(),
        ..Default::default()
    };
    let result = AccessLog::start(config, MemorySink::new());
    assert!(matches!(
        result,
        Err(AccessLogError::Format(FormatError::UnterminatedParameter { position: 3 }))
    ));
}

#[tokio::test]
async fn test_start_rejects_bad_exclude() {
    let config = AccessLogConfig {
        excludes: vec!["^/ok".into(), "(".into()],
        ..Default::default()
    };
    match AccessLog::start(config, MemorySink::new()) {
        Err(AccessLogError::Exclude { pattern, .. }) => assert_eq!(pattern, "("),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("bad exclude pattern accepted"),
    }
}

#[tokio::test]
async fn test_start_rejects_bad_sizes() {
    let tiny = AccessLogConfig {
        buffer_size: 100,
        ..Default::default()
    };
    assert!(matches!(
        AccessLog::start(tiny, MemorySink::new()),
        Err(AccessLogError::Config(_))
    ));

    let empty = AccessLogConfig {
        pool_capacity: 0,
        ..Default::default()
    };
    assert!(matches!(
        AccessLog::start(empty, MemorySink::new()),
        Err(AccessLogError::Config(_))
    ));
}

// =============================================================================
// Logging
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_default_line_end_to_end() {
    let sink = MemorySink::new();
    let log = AccessLog::start(utc_config(), sink.clone()).unwrap();

    assert!(log.log_at(&get("/foo"), at(BASE)).unwrap());
    let metrics = log.shutdown().await.unwrap();

    assert_eq!(
        String::from_utf8(sink.contents()).unwrap(),
        "127.0.0.1 - - [15/Jan/2010:10:30:45 +0000] \"GET /foo HTTP/1.1\" 200 1234 \"-\" \"-\"\n"
    );
    assert_eq!(metrics.logged, 1);
    assert_eq!(metrics.buffers_written, 1);
    assert_eq!(metrics.bytes_written, sink.len() as u64);
    assert!(sink.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_excluded_request_costs_nothing() {
    let sink = MemorySink::new();
    let config = AccessLogConfig {
        excludes: vec!["^/health".into(), r"\.png$".into()],
        ..utc_config()
    };
    let log = AccessLog::start(config, sink.clone()).unwrap();

    assert!(!log.log(&get("/health/live")).unwrap());
    assert!(!log.log(&get("/img/logo.png")).unwrap());
    assert_eq!(log.pool().metrics().snapshot().allocations, 0);

    let metrics = log.shutdown().await.unwrap();
    assert_eq!(metrics.excluded, 2);
    assert_eq!(metrics.logged, 0);
    assert!(sink.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exclude_matches_raw_uri_with_query() {
    let sink = MemorySink::new();
    let config = AccessLogConfig {
        excludes: vec!["debug=1".into()],
        ..utc_config()
    };
    let log = AccessLog::start(config, sink.clone()).unwrap();

    assert!(!log.log(&get("/page?debug=1")).unwrap());
    assert!(log.log(&get("/page?debug=0")).unwrap());

    log.shutdown().await.unwrap();
    assert_eq!(sink.lines().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_producer_order_preserved() {
    let sink = MemorySink::new();
    let config = AccessLogConfig {
        format: "%U".into(),
        pool_capacity: 4,
        ..utc_config()
    };
    let log = Arc::new(AccessLog::start(config, sink.clone()).unwrap());

    let producer = Arc::clone(&log);
    tokio::task::spawn_blocking(move || {
        for i in 0..200 {
            producer.log(&get(&format!("/{i}"))).unwrap();
        }
    })
    .await
    .unwrap();

    log.shutdown().await.unwrap();
    let expected: Vec<String> = (0..200).map(|i| format!("/{i}")).collect();
    assert_eq!(sink.lines(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_producers_all_written() {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 250;

    let sink = MemorySink::new();
    let config = AccessLogConfig {
        pool_capacity: 4,
        ..utc_config()
    };
    let log = Arc::new(AccessLog::start(config, sink.clone()).unwrap());

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let log = Arc::clone(&log);
            tokio::task::spawn_blocking(move || {
                for i in 0..PER_PRODUCER {
                    log.log(&get(&format!("/p{p}/{i}"))).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }

    let metrics = log.shutdown().await.unwrap();
    let total = (PRODUCERS * PER_PRODUCER) as u64;

    assert_eq!(metrics.logged, total);
    assert_eq!(metrics.buffers_written, total);
    assert_eq!(metrics.bytes_written, sink.len() as u64);
    assert_eq!(sink.lines().len(), PRODUCERS * PER_PRODUCER);
    assert_eq!(log.pool().available(), log.pool().capacity());
    assert!(metrics.pool.peak_in_flight <= 4);

    // Each producer's own lines stay in its order
    let lines = sink.lines();
    for p in 0..PRODUCERS {
        let prefix = format!("\"GET /p{p}/");
        let seq: Vec<usize> = lines
            .iter()
            .filter_map(|line| {
                let start = line.find(&prefix)? + prefix.len();
                let end = start + line[start..].find(' ')?;
                line[start..end].parse().ok()
            })
            .collect();
        assert_eq!(seq, (0..PER_PRODUCER).collect::<Vec<_>>());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hostname_lookup_uses_resolver() {
    let resolver: Arc<dyn HostResolver> = Arc::new(
        StaticHostResolver::new().with_host(IpAddr::V4(Ipv4Addr::LOCALHOST), "localhost"),
    );

    let sink = MemorySink::new();
    let config = AccessLogConfig {
        format: "%h".into(),
        hostname_lookup: true,
        ..utc_config()
    };
    let log = AccessLog::start_with_resolver(config, sink.clone(), Arc::clone(&resolver)).unwrap();
    log.log(&get("/")).unwrap();
    log.log(&get("/").with_remote_addr(Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)))))
        .unwrap();
    log.shutdown().await.unwrap();
    assert_eq!(sink.lines(), vec!["localhost", "10.0.0.9"]);

    // Lookup disabled ignores the resolver
    let sink = MemorySink::new();
    let config = AccessLogConfig {
        format: "%h".into(),
        ..utc_config()
    };
    let log = AccessLog::start_with_resolver(config, sink.clone(), resolver).unwrap();
    log.log(&get("/")).unwrap();
    log.shutdown().await.unwrap();
    assert_eq!(sink.lines(), vec!["127.0.0.1"]);
}

// =============================================================================
// Flush
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_flush_writes_and_flushes_sink() {
    let sink = MemorySink::new();
    let config = AccessLogConfig {
        drain_interval: Duration::from_secs(3600),
        ..utc_config()
    };
    let log = AccessLog::start(config, sink.clone()).unwrap();

    log.log(&get("/a")).unwrap();
    log.log(&get("/b")).unwrap();
    log.flush().await.unwrap();

    assert_eq!(sink.lines().len(), 2);
    assert!(sink.flush_count() >= 1);
    assert!(sink.rollover_checks() >= 1);

    log.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wait_for_flush_sees_empty_pipeline() {
    let sink = MemorySink::new();
    let config = AccessLogConfig {
        auto_flush: true,
        drain_interval: Duration::from_secs(3600),
        ..utc_config()
    };
    let log = AccessLog::start(config, sink.clone()).unwrap();

    log.log(&get("/eager")).unwrap();
    assert!(log.wait_for_flush(Duration::from_secs(5)).await);
    assert_eq!(sink.lines().len(), 1);

    log.shutdown().await.unwrap();
    assert!(sink.flush_count() >= 1);
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_log_after_shutdown_is_rejected() {
    let sink = MemorySink::new();
    let log = AccessLog::start(utc_config(), sink.clone()).unwrap();

    log.log(&get("/before")).unwrap();
    let first = log.shutdown().await.unwrap();
    assert!(!log.is_active());

    assert!(matches!(log.log(&get("/after")), Err(AccessLogError::Closed)));
    assert!(matches!(log.flush().await, Err(AccessLogError::Closed)));

    // A second shutdown is a no-op
    let second = log.shutdown().await.unwrap();
    assert_eq!(first.buffers_written, second.buffers_written);
    assert_eq!(sink.lines().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_producer_waiting_for_buffer_is_refused_after_shutdown() {
    let sink = MemorySink::new();
    let config = AccessLogConfig {
        pool_capacity: 1,
        ..utc_config()
    };
    let log = Arc::new(AccessLog::start(config, sink.clone()).unwrap());

    let held = log.pool().allocate();
    let producer = {
        let log = Arc::clone(&log);
        std::thread::spawn(move || log.log(&get("/late")))
    };
    while log.pool().metrics().snapshot().waits == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let metrics = log.shutdown().await.unwrap();
    drop(held);

    assert!(matches!(producer.join().unwrap(), Err(AccessLogError::Closed)));
    assert_eq!(metrics.logged, 0);
    assert!(sink.lines().is_empty());
    assert_eq!(log.pool().available(), log.pool().capacity());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lines_enqueued_after_final_drain_are_counted_dropped() {
    let sink = MemorySink::new();
    let log = AccessLog::start(utc_config(), sink.clone()).unwrap();
    log.shutdown().await.unwrap();

    // Same state a producer racing the final drain leaves behind
    let mut buffer = log.pool().allocate();
    buffer.set_len(1);
    log.queue.enqueue(buffer);

    assert_eq!(log.drop_leftovers(), 1);
    assert_eq!(log.drop_leftovers(), 0);
    assert_eq!(log.queue.pending(), 0);
    assert_eq!(log.metrics().dropped, 1);
    assert_eq!(log.pool().available(), log.pool().capacity());
    assert!(sink.lines().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sink_failures_do_not_stop_pipeline() {
    let sink = MemorySink::new();
    let config = AccessLogConfig {
        retry_delay: Duration::from_millis(1),
        ..utc_config()
    };
    let log = AccessLog::start(config, sink.clone()).unwrap();

    sink.fail_next_writes(3);
    log.log(&get("/lost")).unwrap();
    log.flush().await.unwrap();
    log.log(&get("/kept")).unwrap();

    let metrics = log.shutdown().await.unwrap();
    assert_eq!(metrics.write_failures, 1);
    assert_eq!(metrics.buffers_written, 1);
    assert_eq!(log.pool().available(), log.pool().capacity());
    assert_eq!(sink.lines().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rotating_file_sink_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RotatingFileSink::open(
        RotatingFileConfig::default()
            .with_path(dir.path().join("access"))
            .with_period(RolloverPeriod::Never),
    )
    .unwrap();

    let log = AccessLog::start(utc_config(), sink).unwrap();
    for i in 0..3 {
        log.log_at(&get(&format!("/file/{i}")), at(BASE)).unwrap();
    }
    let metrics = log.shutdown().await.unwrap();

    let contents = std::fs::read_to_string(dir.path().join("access.log")).unwrap();
    assert_eq!(contents.lines().count(), 3);
    assert!(contents.starts_with("127.0.0.1 - - [15/Jan/2010:10:30:45 +0000] \"GET /file/0 "));
    assert_eq!(metrics.bytes_written, contents.len() as u64);
}
