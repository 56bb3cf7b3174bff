//! Sink errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while setting up a sink
///
/// Runtime write failures are plain `io::Error`s: the writer task logs and
/// swallows them per buffer, so they never need a richer type.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Failed to create the log directory
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to open the active log file
    #[error("failed to open log file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid sink configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Other I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
