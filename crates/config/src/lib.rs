//! Access Log Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use alog_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[access_log]\npath = \"/var/log/app/access\"").unwrap();
//! assert_eq!(config.access_log.path, "/var/log/app/access");
//! ```
//!
//! # Example Full Config
//!
//! ```toml
//! [log]
//! level = "info"
//! format = "console"
//!
//! [access_log]
//! path = "logs/access"
//! format = '%h %l %u %t "%r" %>s %b "%{Referer}i" "%{User-Agent}i"'
//! time_format = "[%d/%b/%Y:%H:%M:%S %z]"
//! time_zone = "local"
//! auto_flush = false
//! auto_flush_time = "60s"
//! drain_interval = "100ms"
//! buffer_pool_size = 64
//! buffer_size = 65536
//! exclude = ["^/health", "\\.png$"]
//!
//! [rollover]
//! period = "daily"
//! size = 1073741824
//! count = 0
//! compression = "none"
//! ```

mod access_log;
mod error;
mod logging;
mod rollover;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use access_log::{AccessLogSinkConfig, DEFAULT_FORMAT, DEFAULT_TIME_FORMAT};
pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use rollover::{Compression, DEFAULT_ROLLOVER_SIZE, RolloverConfig, RolloverPeriod};
pub use validation::MIN_BUFFER_SIZE;

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Internal diagnostics
    pub log: LogConfig,

    /// Access log format and pipeline sizing
    pub access_log: AccessLogSinkConfig,

    /// Log file rollover policy
    pub rollover: RolloverConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML, or fails
    /// validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
