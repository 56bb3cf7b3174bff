//! Chain writers for log files
//!
//! A chain writer wraps an opened log file with buffering and optional
//! compression. The rotating file sink holds one `ChainWrite` per active file
//! and swaps it out on rollover.
//!
//! # Available Writers
//!
//! - `PlainTextWriter` - buffered text output (`.log`)
//! - `Lz4Writer` - LZ4 frame compressed output (`.log.lz4`)
//!
//! # Example
//!
//! ```ignore
//! use std::fs::File;
//! use alog_sinks::util::{ChainWriter, PlainTextWriter};
//!
//! let writer = PlainTextWriter::new(64 * 1024);
//! let file = File::create("access.log")?;
//! let mut chain = writer.wrap(file, 0)?;
//!
//! chain.write_all(b"127.0.0.1 - - [..] \"GET / HTTP/1.1\" 200 12\n")?;
//! chain.flush_all()?;
//! ```

use lz4_flex::frame::FrameEncoder;
use std::fs::File;
use std::io::{self, BufWriter, Write};

/// Default buffer size for log file writers (1MB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Compression applied to the active log file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    /// Plain text (default)
    #[default]
    None,
    /// LZ4 frame compression
    Lz4,
}

impl Compression {
    /// Build the chain writer for this compression mode
    pub fn chain_writer(self, buffer_size: usize) -> Box<dyn ChainWriter> {
        match self {
            Compression::None => Box::new(PlainTextWriter::new(buffer_size)),
            Compression::Lz4 => Box::new(Lz4Writer::new(buffer_size)),
        }
    }
}

/// Factory wrapping files with a buffering/compression strategy
pub trait ChainWriter: Send + Sync {
    /// Wrap a file opened for append
    ///
    /// `existing_len` is the size the file already had, so size-based
    /// rollover keeps counting across process restarts.
    fn wrap(&self, file: File, existing_len: u64) -> io::Result<Box<dyn ChainWrite>>;

    /// File extension for files produced by this writer
    fn file_extension(&self) -> &'static str;
}

/// Write side of an active log file
pub trait ChainWrite: Write + Send {
    /// Flush all buffered data to the underlying file
    fn flush_all(&mut self) -> io::Result<()>;

    /// Finish the stream (compression trailer) and close the file
    fn finish(self: Box<Self>) -> io::Result<()>;

    /// Bytes accepted so far, including what the file held when opened
    fn bytes_written(&self) -> u64;
}

// ============================================================================
// PlainTextWriter
// ============================================================================

/// Buffered plain text writer
#[derive(Debug, Clone)]
pub struct PlainTextWriter {
    buffer_size: usize,
}

impl PlainTextWriter {
    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size }
    }
}

impl Default for PlainTextWriter {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl ChainWriter for PlainTextWriter {
    fn wrap(&self, file: File, existing_len: u64) -> io::Result<Box<dyn ChainWrite>> {
        Ok(Box::new(PlainChain {
            writer: BufWriter::with_capacity(self.buffer_size, file),
            bytes_written: existing_len,
        }))
    }

    fn file_extension(&self) -> &'static str {
        ".log"
    }
}

struct PlainChain {
    writer: BufWriter<File>,
    bytes_written: u64,
}

impl Write for PlainChain {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl ChainWrite for PlainChain {
    fn flush_all(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }

    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.writer.flush()
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

// ============================================================================
// Lz4Writer
// ============================================================================

/// LZ4 frame writer
///
/// Size accounting uses uncompressed bytes, so `size`-based rollover limits
/// the amount of log text per file rather than its on-disk footprint.
#[derive(Debug, Clone)]
pub struct Lz4Writer {
    buffer_size: usize,
}

impl Lz4Writer {
    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size }
    }
}

impl Default for Lz4Writer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl ChainWriter for Lz4Writer {
    fn wrap(&self, file: File, existing_len: u64) -> io::Result<Box<dyn ChainWrite>> {
        let encoder = FrameEncoder::new(BufWriter::with_capacity(self.buffer_size, file));
        Ok(Box::new(Lz4Chain {
            encoder,
            bytes_written: existing_len,
        }))
    }

    fn file_extension(&self) -> &'static str {
        ".log.lz4"
    }
}

struct Lz4Chain {
    encoder: FrameEncoder<BufWriter<File>>,
    bytes_written: u64,
}

impl Write for Lz4Chain {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.encoder.write(buf)?;
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl ChainWrite for Lz4Chain {
    fn flush_all(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut inner = self.encoder.finish().map_err(io::Error::other)?;
        inner.flush()
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

#[cfg(test)]
#[path = "chain_writer_test.rs"]
mod chain_writer_test;
