//! Configuration validation
//!
//! Checks values that parse fine as TOML but cannot run:
//! - Empty access log path
//! - Zero-sized buffer pool, buffers too small for a line
//! - Exclude patterns that are not valid regexes
//! - Unparseable time zone
//! - Zero drain or flush intervals

use regex::Regex;

use crate::Config;
use crate::error::{ConfigError, Result};

/// Smallest buffer that leaves room for a useful line
pub const MIN_BUFFER_SIZE: usize = 1024;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_access_log(config)?;
    Ok(())
}

fn validate_access_log(config: &Config) -> Result<()> {
    let access = &config.access_log;

    if access.path.trim().is_empty() {
        return Err(ConfigError::missing_field("access_log", "path"));
    }

    if access.buffer_pool_size == 0 {
        return Err(ConfigError::invalid_value(
            "access_log",
            "buffer_pool_size",
            "must be at least 1",
        ));
    }

    if access.buffer_size < MIN_BUFFER_SIZE {
        return Err(ConfigError::invalid_value(
            "access_log",
            "buffer_size",
            format!("must be at least {MIN_BUFFER_SIZE} bytes"),
        ));
    }

    if access.drain_interval.is_zero() {
        return Err(ConfigError::invalid_value(
            "access_log",
            "drain_interval",
            "must be greater than zero",
        ));
    }

    if access.auto_flush_time.is_zero() {
        return Err(ConfigError::invalid_value(
            "access_log",
            "auto_flush_time",
            "must be greater than zero",
        ));
    }

    for pattern in &access.exclude {
        Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })?;
    }

    access.fixed_offset()?;

    Ok(())
}
