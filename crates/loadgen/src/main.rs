//! Access log load generator
//!
//! Pushes synthetic requests through the access-log pipeline from several
//! blocking producer threads and reports throughput and pipeline counters.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 4 producers, 100k requests each, rotating file under logs/
//! alog-loadgen
//!
//! # Measure the pipeline alone
//! alog-loadgen --sink null --threads 8 --requests 1000000
//!
//! # Use a config file (log format, pool size, rollover policy)
//! alog-loadgen --config configs/access.toml --log-level debug
//! ```

mod traffic;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use alog_accesslog::{
    AccessLog, AccessLogConfig, HostResolver, LogTimeZone, MetricsSnapshot, StaticHostResolver,
};
use alog_config::{Config, LogFormat};
use alog_sinks::{
    AccessLogSink, Compression, MemorySink, NullSink, RolloverPeriod, RotatingFileConfig,
    RotatingFileSink,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Access log load generator
#[derive(Parser, Debug)]
#[command(name = "alog-loadgen")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (error if specified but not found)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Producer threads
    #[arg(short, long, default_value_t = 4)]
    threads: usize,

    /// Requests per producer
    #[arg(short, long, default_value_t = 100_000)]
    requests: usize,

    /// Where rendered lines go
    #[arg(short, long, value_enum, default_value_t = SinkKind::File)]
    sink: SinkKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    /// Rotating file from the `[access_log]` and `[rollover]` sections
    File,
    /// In-memory buffer, discarded at exit
    Memory,
    /// Count bytes only
    Null,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.log.directives());
    init_logging(&level, config.log.format)?;

    let sink = build_sink(cli.sink, &config)?;
    let log_config = access_log_config(&config)?;
    let log = if config.access_log.hostname_dns_lookup {
        AccessLog::start_with_resolver(log_config, sink, loopback_resolver())?
    } else {
        AccessLog::start(log_config, sink)?
    };
    let log = Arc::new(log);

    tracing::info!(
        threads = cli.threads,
        requests = cli.requests,
        sink = ?cli.sink,
        "starting load"
    );

    let started = Instant::now();
    let producers: Vec<_> = (0..cli.threads)
        .map(|producer| {
            let log = Arc::clone(&log);
            let requests = cli.requests;
            tokio::task::spawn_blocking(move || -> Result<usize> {
                let mut logged = 0;
                for n in 0..requests {
                    let exchange = traffic::exchange(producer, n, SystemTime::now());
                    if log.log(&exchange)? {
                        logged += 1;
                    }
                }
                Ok(logged)
            })
        })
        .collect();

    let mut logged = 0;
    for producer in producers {
        logged += producer.await.context("producer panicked")??;
    }
    let produced = started.elapsed();

    let metrics = log.shutdown().await?;
    let total = started.elapsed();

    report(cli.threads * cli.requests, logged, produced, total, &metrics);
    Ok(())
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Console => registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }

    Ok(())
}

fn access_log_config(config: &Config) -> Result<AccessLogConfig> {
    let section = &config.access_log;
    let time_zone = match section.fixed_offset()? {
        Some(offset) => LogTimeZone::Fixed(offset),
        None => LogTimeZone::Local,
    };

    Ok(AccessLogConfig {
        format: section.format.clone(),
        time_format: section.time_format.clone(),
        time_zone,
        auto_flush: section.auto_flush,
        auto_flush_interval: section.auto_flush_time,
        drain_interval: section.drain_interval,
        pool_capacity: section.buffer_pool_size,
        buffer_size: section.buffer_size,
        excludes: section.exclude.clone(),
        hostname_lookup: section.hostname_dns_lookup,
        ..Default::default()
    })
}

fn build_sink(kind: SinkKind, config: &Config) -> Result<Box<dyn AccessLogSink>> {
    let sink: Box<dyn AccessLogSink> = match kind {
        SinkKind::File => {
            let rollover = &config.rollover;
            let period = match rollover.period {
                alog_config::RolloverPeriod::Hourly => RolloverPeriod::Hourly,
                alog_config::RolloverPeriod::Daily => RolloverPeriod::Daily,
                alog_config::RolloverPeriod::Monthly => RolloverPeriod::Monthly,
                alog_config::RolloverPeriod::Never => RolloverPeriod::Never,
            };
            let compression = match rollover.compression {
                alog_config::Compression::None => Compression::None,
                alog_config::Compression::Lz4 => Compression::Lz4,
            };
            let sink_config = RotatingFileConfig::default()
                .with_path(&config.access_log.path)
                .with_period(period)
                .with_max_size(rollover.size)
                .with_max_archives(rollover.count)
                .with_compression(compression);
            Box::new(RotatingFileSink::open(sink_config)?)
        }
        SinkKind::Memory => Box::new(MemorySink::new()),
        SinkKind::Null => Box::new(NullSink::new()),
    };
    Ok(sink)
}

/// Synthetic traffic comes from private and loopback addresses only
fn loopback_resolver() -> Arc<dyn HostResolver> {
    Arc::new(
        StaticHostResolver::new()
            .with_host(IpAddr::V4(Ipv4Addr::LOCALHOST), "localhost")
            .with_host(IpAddr::V6(Ipv6Addr::LOCALHOST), "localhost"),
    )
}

fn report(
    requested: usize,
    logged: usize,
    produced: std::time::Duration,
    total: std::time::Duration,
    metrics: &MetricsSnapshot,
) {
    let secs = total.as_secs_f64().max(f64::EPSILON);
    let produce_secs = produced.as_secs_f64().max(f64::EPSILON);

    println!("requests      {requested}");
    println!("logged        {logged}");
    println!("excluded      {}", metrics.excluded);
    println!("written       {}", metrics.buffers_written);
    println!("bytes         {}", metrics.bytes_written);
    println!("failures      {}", metrics.write_failures);
    println!("avg line      {:.1} B", metrics.avg_line_len());
    println!(
        "produce       {:.2?} ({:.0} lines/s)",
        produced,
        logged as f64 / produce_secs
    );
    println!(
        "end to end    {:.2?} ({:.0} lines/s, {:.1} MiB/s)",
        total,
        metrics.buffers_written as f64 / secs,
        metrics.bytes_written as f64 / secs / (1024.0 * 1024.0)
    );
    println!(
        "pool          {} constructed, {:.1}% reused, {} waits, peak {}",
        metrics.pool.constructions,
        metrics.pool.reuse_rate() * 100.0,
        metrics.pool.waits,
        metrics.pool.peak_in_flight
    );
    println!(
        "time cache    {} full renders, {} patches",
        metrics.time.full_renders, metrics.time.patches
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_match_pipeline_defaults() {
        assert_eq!(alog_config::DEFAULT_FORMAT, alog_accesslog::DEFAULT_FORMAT);
        assert_eq!(alog_config::DEFAULT_TIME_FORMAT, alog_accesslog::DEFAULT_TIME_FORMAT);
        assert_eq!(alog_config::MIN_BUFFER_SIZE, alog_accesslog::MIN_BUFFER_SIZE);
    }

    #[test]
    fn test_default_config_maps_to_pipeline_config() {
        let config = Config::default();
        let mapped = access_log_config(&config).unwrap();

        assert_eq!(mapped.format, alog_accesslog::DEFAULT_FORMAT);
        assert_eq!(mapped.pool_capacity, config.access_log.buffer_pool_size);
        assert_eq!(mapped.buffer_size, config.access_log.buffer_size);
    }
}
