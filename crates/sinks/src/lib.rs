//! Access Log - Sinks
//!
//! Destinations for rendered access-log bytes. The access-log writer task owns
//! exactly one sink and is the only caller, so sinks are plain `&mut self`
//! objects with no internal synchronization on the write path.
//!
//! # Architecture
//!
//! ```text
//! [Writer Task] --&[u8]--> [AccessLogSink] --> [ChainWrite] --> [File]
//!                               |
//!                          rollover(): archive + reopen
//! ```
//!
//! # Available Sinks
//!
//! | Sink | Purpose | Rolls over |
//! |------|---------|------------|
//! | `rotating_file` | Production log files (plain or LZ4) | Yes |
//! | `memory` | Tests and dry runs, inspectable handle | No |
//! | `null` | Benchmarking (discard all) | No |

/// The sink contract consumed by the access-log writer
mod sink;

/// Sink construction errors
mod error;

/// Rotating file sink - time and size based rollover with archival
pub mod rotating_file;

/// In-memory sink with a cloneable inspection handle
pub mod memory;

/// Null sink - discards all bytes (for benchmarking)
pub mod null;

/// Shared utilities (chain writers, rate-limited logging)
pub mod util;

pub use error::SinkError;
pub use memory::MemorySink;
pub use null::{NullSink, NullSinkHandle};
pub use rotating_file::{RolloverPeriod, RotatingFileConfig, RotatingFileSink};
pub use sink::AccessLogSink;
pub use util::{Compression, RateLimitedLogger};
