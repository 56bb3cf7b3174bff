//! Sink utilities
//!
//! - **chain_writer**: buffered plain / LZ4 writers wrapping the active file
//! - **rate_limited_logger**: error logging that survives a failing disk

pub mod chain_writer;
pub mod rate_limited_logger;

pub use chain_writer::{
    ChainWrite, ChainWriter, Compression, DEFAULT_BUFFER_SIZE, Lz4Writer, PlainTextWriter,
};
pub use rate_limited_logger::{DEFAULT_LOG_INTERVAL, RateLimitedLogger};
