//! Access Log - request logging pipeline
//!
//! Renders one line per finished HTTP exchange in an Apache-style format and
//! hands it to a background writer without doing any I/O on the request
//! thread.
//!
//! # Architecture
//!
//! ```text
//! [request thread]                                    [writer task]
//!   exclude check -> BufferPool::allocate                    |
//!   Renderer::render -> DispatchQueue::enqueue --wake-->  drain_all
//!                                                           |
//!                                            AccessLogSink::write / flush
//!                                                           |
//!                                                  buffer back to the pool
//! ```
//!
//! The pool bounds memory: once every buffer is in flight, `log` blocks
//! until the writer frees one. Lines reach the sink in queue order.
//!
//! # Formats
//!
//! | Directive | Output |
//! |-----------|--------|
//! | `%h` | remote address (or host name with lookup on) |
//! | `%l` | `-` |
//! | `%u` | quoted remote user |
//! | `%t` / `%{pattern}t` | request time |
//! | `%r` | request line |
//! | `%s` / `%>s` | status |
//! | `%b` | content length, `-` on 304 |
//! | `%{name}i` / `%{name}o` | request / response header |
//! | `%{name}c` | cookie |
//! | `%{name}n` | request attribute |
//! | `%T` / `%D` | elapsed seconds / microseconds |
//! | `%v` | server name |
//! | `%U` | request path |
//!
//! ```
//! use alog_accesslog::{BufferPool, HttpExchange, RecordedExchange};
//!
//! let pool = BufferPool::new(2, 1024);
//! let buf = pool.allocate();
//! assert_eq!(pool.in_flight(), 1);
//! drop(buf);
//! assert_eq!(pool.in_flight(), 0);
//!
//! let exchange = RecordedExchange::new("GET", "/search?q=rust");
//! assert_eq!(exchange.request_uri(), "/search");
//! ```

mod access_log;
pub mod buffer_pool;
mod error;
pub mod exchange;
pub mod format;
pub mod metrics;
pub mod queue;
pub mod render;
pub mod time_cache;
mod writer;

pub use access_log::{AccessLog, AccessLogConfig, MIN_BUFFER_SIZE};
pub use buffer_pool::{BufferPool, LogBuffer, PoolMetricsSnapshot};
pub use error::{AccessLogError, FormatError};
pub use exchange::{
    HostResolver, HttpExchange, RecordedExchange, ResponseCookie, StaticHostResolver,
};
pub use format::{DEFAULT_FORMAT, Field, Segment, compile};
pub use metrics::MetricsSnapshot;
pub use queue::DispatchQueue;
pub use render::Renderer;
pub use time_cache::{DEFAULT_TIME_FORMAT, LogTimeZone, TimeCache, TimeCacheStats};
