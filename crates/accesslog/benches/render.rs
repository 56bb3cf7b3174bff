//! Access log benchmark suite
//!
//! Run with: `cargo bench -p alog-accesslog --bench render`
//!
//! # What we measure
//!
//! - Format compilation (startup cost only)
//! - Line rendering into a pooled buffer (the request-thread hot path)
//! - Time cache: same second, patched minute, full render
//! - Pool allocate/free cycle
//! - End-to-end logging into a null sink

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alog_accesslog::{
    AccessLog, AccessLogConfig, BufferPool, DEFAULT_FORMAT, DEFAULT_TIME_FORMAT, LogTimeZone,
    RecordedExchange, Renderer, TimeCache, compile,
};
use alog_sinks::NullSink;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

/// 2010-01-15 10:30:45 UTC
const BASE: u64 = 1_263_551_445;

const COMBINED_WITH_TIMING: &str =
    r#"%h %l %u %t "%r" %>s %b "%{Referer}i" "%{User-Agent}i" %D %{X-Request-Id}o"#;

fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

fn exchange() -> RecordedExchange {
    RecordedExchange::new("GET", "/api/v1/items?page=3&sort=desc")
        .with_content_length(18_432)
        .with_request_header("Referer", "https://example.com/items")
        .with_request_header(
            "User-Agent",
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)",
        )
        .with_response_header("X-Request-Id", "6f1c0e2a-53b7-4a0e-9d55-0c4b9f3e8a21")
        .with_start_time(at(BASE) - Duration::from_millis(12))
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_compile");

    for (name, format) in [("default", DEFAULT_FORMAT), ("with_timing", COMBINED_WITH_TIMING)] {
        group.bench_with_input(BenchmarkId::from_parameter(name), format, |b, format| {
            b.iter(|| compile(black_box(format)));
        });
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    let exchange = exchange();
    let pool = BufferPool::new(1, 64 * 1024);
    let now = at(BASE);

    for (name, format) in [("default", DEFAULT_FORMAT), ("with_timing", COMBINED_WITH_TIMING)] {
        let Ok(renderer) = Renderer::compile(format, DEFAULT_TIME_FORMAT, LogTimeZone::utc()) else {
            continue;
        };
        let mut buf = pool.allocate();
        let line_len = renderer.render(&exchange, now, buf.as_mut_slice(), 0);

        group.throughput(Throughput::Bytes(line_len as u64));
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| renderer.render(black_box(&exchange), now, buf.as_mut_slice(), 0));
        });
    }

    group.finish();
}

fn bench_time_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("time_cache");
    let Ok(cache) = TimeCache::new(DEFAULT_TIME_FORMAT, LogTimeZone::utc()) else {
        return;
    };

    group.bench_function("same_second", |b| {
        b.iter(|| cache.with_bytes(black_box(at(BASE)), |bytes| bytes.len()));
    });

    // Alternating seconds within one hour take the patch path
    let mut tick = 0u64;
    group.bench_function("patched", |b| {
        b.iter(|| {
            tick = (tick + 1) % 600;
            cache.with_bytes(black_box(at(BASE + tick)), |bytes| bytes.len())
        });
    });

    // Alternating hours always re-render
    let mut hour = 0u64;
    group.bench_function("full_render", |b| {
        b.iter(|| {
            hour ^= 1;
            cache.with_bytes(black_box(at(BASE + hour * 3600)), |bytes| bytes.len())
        });
    });

    group.finish();
}

fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool");
    let pool = BufferPool::new(64, 64 * 1024);

    group.bench_function("allocate_free", |b| {
        b.iter(|| {
            let buf = pool.allocate();
            black_box(buf.capacity());
        });
    });

    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("access_log");
    let Ok(rt) = Runtime::new() else {
        return;
    };

    for lines in [1_000u64, 10_000] {
        group.throughput(Throughput::Elements(lines));
        group.bench_with_input(BenchmarkId::new("null_sink", lines), &lines, |b, &lines| {
            b.iter_custom(|iters| {
                let config = AccessLogConfig {
                    time_zone: LogTimeZone::utc(),
                    ..Default::default()
                };
                let start = async move { AccessLog::start(config, NullSink::new()) };
                let Ok(log) = rt.block_on(start) else {
                    return Duration::ZERO;
                };
                let exchange = exchange();

                let began = std::time::Instant::now();
                for _ in 0..iters {
                    for _ in 0..lines {
                        let _ = log.log(&exchange);
                    }
                }
                let _ = rt.block_on(log.shutdown());
                began.elapsed()
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_compile,
    bench_render,
    bench_time_cache,
    bench_pool,
    bench_end_to_end,
);
criterion_main!(benches);
