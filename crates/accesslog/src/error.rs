//! Access log error types

use thiserror::Error;

/// Errors raised while compiling a log format
///
/// Positions are byte offsets of the `%` that starts the directive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// `%{...` without a closing brace
    #[error("unterminated '{{' parameter at byte {position}")]
    UnterminatedParameter { position: usize },

    /// `%{param}` or `%>` at the end of the format
    #[error("missing directive after '%' modifier at byte {position}")]
    MissingDirective { position: usize },

    /// `%{param}X` or `%>X` where `X` is not a known directive
    #[error("unknown directive '%{directive}' at byte {position}")]
    UnknownDirective { directive: char, position: usize },

    /// `i`, `o`, `n` or `c` without a `{name}`
    #[error("directive '%{directive}' at byte {position} requires a {{name}} parameter")]
    MissingParameter { directive: char, position: usize },

    /// strftime pattern chrono cannot format
    #[error("invalid time pattern '{pattern}'")]
    InvalidTimePattern { pattern: String },
}

/// Errors raised by the access log facade
#[derive(Debug, Error)]
pub enum AccessLogError {
    #[error("invalid log format: {0}")]
    Format(#[from] FormatError),

    #[error("invalid exclude pattern '{pattern}': {source}")]
    Exclude {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid access log configuration: {0}")]
    Config(String),

    /// `start` was called outside a tokio runtime
    #[error("access log must be started inside a tokio runtime")]
    NoRuntime,

    #[error("access log is shut down")]
    Closed,

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("writer task failed: {0}")]
    Writer(#[from] tokio::task::JoinError),
}

impl AccessLogError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
