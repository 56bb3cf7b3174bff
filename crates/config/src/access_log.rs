//! Access log configuration
//!
//! What gets logged, how it is formatted, and how the buffering pipeline is
//! sized.

use std::time::Duration;

use chrono::FixedOffset;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

// Kept equal to the `alog-accesslog` defaults; checked by the loadgen tests

/// Apache combined log format
pub const DEFAULT_FORMAT: &str = r#"%h %l %u %t "%r" %>s %b "%{Referer}i" "%{User-Agent}i""#;

/// Apache-style bracketed timestamp
pub const DEFAULT_TIME_FORMAT: &str = "[%d/%b/%Y:%H:%M:%S %z]";

/// Access log configuration
///
/// # Example
///
/// ```toml
/// [access_log]
/// path = "logs/access"
/// format = '%h %l %u %t "%r" %>s %b'
/// auto_flush_time = "30s"
/// exclude = ["^/health"]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccessLogSinkConfig {
    /// Active file path without extension
    /// Default: "logs/access"
    pub path: String,

    /// Line format (`%` directives)
    /// Default: Apache combined format
    pub format: String,

    /// strftime pattern for `%t`
    /// Default: "[%d/%b/%Y:%H:%M:%S %z]"
    pub time_format: String,

    /// "local", "utc", or a fixed offset such as "+05:30"
    /// Default: "local"
    pub time_zone: String,

    /// Flush the sink after every drain
    /// Default: false
    pub auto_flush: bool,

    /// Periodic flush interval when `auto_flush` is off
    /// Default: 60s
    #[serde(with = "humantime_serde")]
    pub auto_flush_time: Duration,

    /// How often the writer drains the queue without being woken
    /// Default: 100ms
    #[serde(with = "humantime_serde")]
    pub drain_interval: Duration,

    /// Maximum buffers in flight (producer backpressure bound)
    /// Default: 64
    pub buffer_pool_size: usize,

    /// Bytes per buffer (longest renderable line)
    /// Default: 65536
    pub buffer_size: usize,

    /// URI regexes whose requests are not logged
    /// Default: []
    pub exclude: Vec<String>,

    /// Resolve `%h` to a hostname
    /// Default: false
    pub hostname_dns_lookup: bool,
}

impl Default for AccessLogSinkConfig {
    fn default() -> Self {
        Self {
            path: "logs/access".into(),
            format: DEFAULT_FORMAT.into(),
            time_format: DEFAULT_TIME_FORMAT.into(),
            time_zone: "local".into(),
            auto_flush: false,
            auto_flush_time: Duration::from_secs(60),
            drain_interval: Duration::from_millis(100),
            buffer_pool_size: 64,
            buffer_size: 64 * 1024,
            exclude: Vec::new(),
            hostname_dns_lookup: false,
        }
    }
}

impl AccessLogSinkConfig {
    /// Parse `time_zone`: `Ok(None)` means the host's local zone
    pub fn fixed_offset(&self) -> Result<Option<FixedOffset>> {
        let zone = self.time_zone.trim();
        if zone.eq_ignore_ascii_case("local") {
            return Ok(None);
        }
        if zone.eq_ignore_ascii_case("utc") || zone.eq_ignore_ascii_case("z") {
            return Ok(FixedOffset::east_opt(0));
        }
        zone.parse::<FixedOffset>().map(Some).map_err(|e| {
            ConfigError::invalid_value(
                "access_log",
                "time_zone",
                format!("'{zone}' is not local, utc, or +HH:MM ({e})"),
            )
        })
    }
}
