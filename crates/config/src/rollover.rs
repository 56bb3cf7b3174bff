//! Rollover configuration for the access log file

use serde::Deserialize;

/// Default size limit before a rollover (1GB)
pub const DEFAULT_ROLLOVER_SIZE: u64 = 1024 * 1024 * 1024;

/// Time-based rollover period
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RolloverPeriod {
    Hourly,
    /// Default
    #[default]
    Daily,
    Monthly,
    /// Size-based rollover only
    Never,
}

/// Compression applied to the active file
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Lz4,
}

/// Rollover configuration
///
/// # Example
///
/// ```toml
/// [rollover]
/// period = "hourly"
/// size = 104857600
/// count = 24
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RolloverConfig {
    /// Time-based period (hourly, daily, monthly, never)
    /// Default: daily
    pub period: RolloverPeriod,

    /// Roll over once the active file reaches this many bytes (0 disables)
    /// Default: 1GB
    pub size: u64,

    /// Archived files to keep (0 keeps all)
    /// Default: 0
    pub count: usize,

    /// Compression (none, lz4)
    /// Default: none
    pub compression: Compression,
}

impl Default for RolloverConfig {
    fn default() -> Self {
        Self {
            period: RolloverPeriod::Daily,
            size: DEFAULT_ROLLOVER_SIZE,
            count: 0,
            compression: Compression::None,
        }
    }
}
