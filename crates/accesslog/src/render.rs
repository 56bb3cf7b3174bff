//! Renders compiled segments straight into a byte buffer
//!
//! Rendering never fails and never allocates on the common path: absent
//! values print `-`, oversized values are truncated. Truncation follows two
//! rules:
//!
//! - string fields stop short of the last [`FIELD_MARGIN`] bytes of the
//!   buffer, the request URI in `%r` short of the last [`URI_MARGIN`] bytes
//!   (followed by `...`)
//! - every write is also clamped to a hard limit that keeps room for the
//!   line terminator, so the line always ends with it

use std::fmt::{self, Write as _};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::FormatError;
use crate::exchange::{HostResolver, HttpExchange};
use crate::format::{self, Field, Segment};
use crate::time_cache::{LogTimeZone, TimeCache};

/// Bytes kept free after a string field
pub const FIELD_MARGIN: usize = 256;

/// Bytes kept free after the URI of the request line
pub const URI_MARGIN: usize = 128;

/// Bounded cursor over a line buffer
pub(crate) struct LineWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    /// Writes never go past this; the terminator fits after it
    limit: usize,
}

impl<'a> LineWriter<'a> {
    /// Writing starts at `offset` and never before it, even when `offset`
    /// already sits inside the terminator reserve
    pub(crate) fn new(buf: &'a mut [u8], offset: usize, reserve: usize) -> Self {
        let pos = offset.min(buf.len());
        let limit = buf.len().saturating_sub(reserve).max(pos);
        Self { buf, pos, limit }
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub(crate) fn put(&mut self, b: u8) {
        if self.pos < self.limit {
            self.buf[self.pos] = b;
            self.pos += 1;
        }
    }

    /// Copy as much of `bytes` as the hard limit allows
    #[inline]
    pub(crate) fn put_slice(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.limit - self.pos);
        self.buf[self.pos..self.pos + n].copy_from_slice(&bytes[..n]);
        self.pos += n;
    }

    /// String field, truncated to leave [`FIELD_MARGIN`] bytes
    pub(crate) fn put_field(&mut self, bytes: &[u8]) {
        let room = self.field_room();
        self.put_slice(&bytes[..bytes.len().min(room)]);
    }

    /// Request URI, cut with `...` when it would eat into [`URI_MARGIN`]
    pub(crate) fn put_uri(&mut self, uri: &[u8]) {
        let room = self.buf.len().saturating_sub(self.pos + URI_MARGIN);
        if uri.len() > room {
            self.put_slice(&uri[..room]);
            self.put_slice(b"...");
        } else {
            self.put_slice(uri);
        }
    }

    /// Decimal integer, digits built right to left on the stack
    pub(crate) fn put_i64(&mut self, value: i64) {
        if value == 0 {
            self.put(b'0');
            return;
        }
        if value < 0 {
            self.put(b'-');
        }

        let mut digits = [0u8; 20];
        let mut at = digits.len();
        let mut v = value.unsigned_abs();
        while v > 0 {
            at -= 1;
            digits[at] = b'0' + (v % 10) as u8;
            v /= 10;
        }
        self.put_slice(&digits[at..]);
    }

    /// `fmt::Write` view limited like a string field
    pub(crate) fn field_fmt(&mut self) -> FieldFmt<'_, 'a> {
        let budget = self.field_room();
        FieldFmt {
            writer: self,
            budget,
        }
    }

    /// Write the terminator into the reserved space and return the line end
    pub(crate) fn finish(self, terminator: &[u8]) -> usize {
        let n = terminator.len().min(self.buf.len() - self.pos);
        self.buf[self.pos..self.pos + n].copy_from_slice(&terminator[..n]);
        self.pos + n
    }

    fn field_room(&self) -> usize {
        self.buf.len().saturating_sub(self.pos + FIELD_MARGIN)
    }
}

/// Formatting adapter that silently drops output past its budget
pub(crate) struct FieldFmt<'w, 'a> {
    writer: &'w mut LineWriter<'a>,
    budget: usize,
}

impl fmt::Write for FieldFmt<'_, '_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let n = s.len().min(self.budget);
        self.writer.put_slice(&s.as_bytes()[..n]);
        self.budget -= n;
        Ok(())
    }
}

/// Compiled format plus the time caches it needs
pub struct Renderer {
    /// Every segment but the terminator
    segments: Box<[Segment]>,
    terminator: Box<[u8]>,

    /// Cache for `%t`
    time: TimeCache,
    /// One cache per `%{pattern}t`, in segment order
    time_overrides: Box<[TimeCache]>,

    resolver: Option<Arc<dyn HostResolver>>,
}

impl Renderer {
    /// Build a renderer from compiled segments
    pub fn new(
        mut segments: Vec<Segment>,
        time_format: &str,
        zone: LogTimeZone,
    ) -> Result<Self, FormatError> {
        let terminator = match segments.pop() {
            Some(Segment::Text(bytes)) => bytes,
            Some(other) => {
                segments.push(other);
                Box::from(&b"\n"[..])
            }
            None => Box::from(&b"\n"[..]),
        };

        let time_overrides = segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Field(Field::Time(Some(pattern))) => Some(TimeCache::new(pattern, zone)),
                _ => None,
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            segments: segments.into_boxed_slice(),
            terminator,
            time: TimeCache::new(time_format, zone)?,
            time_overrides: time_overrides.into_boxed_slice(),
            resolver: None,
        })
    }

    /// Compile `format` and build a renderer for it
    pub fn compile(format: &str, time_format: &str, zone: LogTimeZone) -> Result<Self, FormatError> {
        Self::new(format::compile(format)?, time_format, zone)
    }

    /// Resolve `%h` through `resolver` instead of printing the address
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Cache backing `%t`
    pub fn time_cache(&self) -> &TimeCache {
        &self.time
    }

    /// Render one line for `exchange` logged at `now` into `buf` from
    /// `offset`, returning the offset after the line terminator
    pub fn render<E: HttpExchange + ?Sized>(
        &self,
        exchange: &E,
        now: SystemTime,
        buf: &mut [u8],
        offset: usize,
    ) -> usize {
        let mut w = LineWriter::new(buf, offset, self.terminator.len());
        let mut overrides = self.time_overrides.iter();

        for segment in self.segments.iter() {
            match segment {
                Segment::Text(bytes) => w.put_slice(bytes),
                Segment::Char(b) => w.put(*b),
                Segment::SetCookie => match exchange.first_response_cookie() {
                    Some(cookie) => {
                        let _ = write!(w.field_fmt(), "{cookie}");
                    }
                    None => w.put(b'-'),
                },
                Segment::Field(Field::Time(pattern)) => {
                    let cache = match pattern {
                        Some(_) => overrides.next().unwrap_or(&self.time),
                        None => &self.time,
                    };
                    cache.with_bytes(now, |bytes| w.put_slice(bytes));
                }
                Segment::Field(field) => self.render_field(field, exchange, now, &mut w),
            }
        }

        w.finish(&self.terminator)
    }

    fn render_field<E: HttpExchange + ?Sized>(
        &self,
        field: &Field,
        exchange: &E,
        now: SystemTime,
        w: &mut LineWriter<'_>,
    ) {
        match field {
            Field::RemoteHost => self.render_host(exchange, w),
            Field::RemoteLogname => w.put(b'-'),
            Field::RemoteUser => match exchange.remote_user() {
                Some(user) => {
                    w.put(b'"');
                    w.put_field(user.as_bytes());
                    w.put(b'"');
                }
                None => w.put(b'-'),
            },
            Field::RequestLine => {
                w.put_slice(exchange.method().as_bytes());
                w.put(b' ');
                w.put_uri(exchange.raw_uri());
                w.put(b' ');
                w.put_slice(exchange.protocol().as_bytes());
            }
            Field::Status => {
                let status = exchange.status();
                w.put(b'0' + ((status / 100) % 10) as u8);
                w.put(b'0' + ((status / 10) % 10) as u8);
                w.put(b'0' + (status % 10) as u8);
            }
            Field::ContentLength => {
                if exchange.status() == 304 {
                    w.put(b'-');
                } else {
                    w.put_i64(exchange.content_length());
                }
            }
            Field::RequestHeader(name) => put_opt(w, exchange.request_header(name)),
            Field::ResponseHeader(name) => put_opt(w, exchange.response_header(name)),
            Field::Attribute(name) => match exchange.attribute(name) {
                Some(value) => {
                    let _ = write!(w.field_fmt(), "{value}");
                }
                None => w.put(b'-'),
            },
            Field::Cookie(name) => put_opt(
                w,
                exchange
                    .request_cookie(name)
                    .or_else(|| exchange.response_cookie(name)),
            ),
            Field::ElapsedSeconds => {
                let millis = elapsed_millis(exchange.start_time(), now);
                w.put_i64(millis.saturating_add(500) / 1000);
            }
            Field::ElapsedMicros => {
                let millis = elapsed_millis(exchange.start_time(), now);
                w.put_i64(millis.saturating_mul(1000));
            }
            Field::ServerName => put_opt(w, exchange.server_name()),
            Field::RequestUri => w.put_slice(exchange.request_uri().as_bytes()),
            // Rendered by the caller with its cache
            Field::Time(_) => {}
        }
    }

    fn render_host<E: HttpExchange + ?Sized>(&self, exchange: &E, w: &mut LineWriter<'_>) {
        let Some(addr) = exchange.remote_addr() else {
            w.put(b'-');
            return;
        };

        if let Some(resolver) = &self.resolver
            && let Some(host) = resolver.lookup(addr)
        {
            w.put_field(host.as_bytes());
            return;
        }

        let _ = write!(w.field_fmt(), "{addr}");
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("segments", &self.segments)
            .field("time_format", &self.time.pattern())
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

#[inline]
fn put_opt(w: &mut LineWriter<'_>, value: Option<&str>) {
    match value {
        Some(v) => w.put_field(v.as_bytes()),
        None => w.put(b'-'),
    }
}

/// Signed milliseconds from `start` to `end`
fn elapsed_millis(start: SystemTime, end: SystemTime) -> i64 {
    match end.duration_since(start) {
        Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_millis()).unwrap_or(i64::MAX),
    }
}

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;
