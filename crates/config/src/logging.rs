//! Diagnostics settings
//!
//! Controls what the pipeline itself reports through `tracing` (startup,
//! sink errors, rollovers, shutdown summary). Access log lines never pass
//! through here.

use std::fmt;

use serde::Deserialize;

/// Minimum severity of pipeline diagnostics
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    /// Per-drain and per-rollover detail
    Debug,
    #[default]
    Info,
    /// Sink write retries show up here
    Warn,
    Error,
}

impl LogLevel {
    /// Filter directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostics output format
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Console,
    /// One JSON object per event
    Json,
}

/// `[log]` section
///
/// ```toml
/// [log]
/// level = "warn"
/// format = "json"
/// filter = "alog_accesslog=debug"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,

    pub format: LogFormat,

    /// Extra per-target directives appended after `level`
    pub filter: Option<String>,
}

impl LogConfig {
    /// Full filter string: the level, then any per-target directives
    pub fn directives(&self) -> String {
        match self.filter.as_deref().map(str::trim) {
            Some(extra) if !extra.is_empty() => format!("{},{}", self.level, extra),
            _ => self.level.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Console);
        assert_eq!(config.directives(), "info");
    }

    #[test]
    fn test_json_with_filter() {
        let config: LogConfig = toml::from_str(
            r#"
level = "warn"
format = "json"
filter = "alog_accesslog=debug"
"#,
        )
        .unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.directives(), "warn,alog_accesslog=debug");
    }

    #[test]
    fn test_blank_filter_ignored() {
        let config = LogConfig {
            level: LogLevel::Debug,
            filter: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(config.directives(), "debug");
    }

    #[test]
    fn test_level_names_round_trip_through_toml() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            let parsed: LogConfig = toml::from_str(&format!("level = \"{level}\"")).unwrap();
            assert_eq!(parsed.level, level);
        }
        assert!(toml::from_str::<LogConfig>("level = \"loud\"").is_err());
    }
}
