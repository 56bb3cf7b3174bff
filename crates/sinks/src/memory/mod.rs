//! Memory sink - keeps written bytes in memory
//!
//! Every clone shares the same buffer, so a test or a dry run keeps one
//! clone for inspection and hands the other to the access log.
//!
//! Failures can be injected with `fail_next_writes` to exercise the writer's
//! error path.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::sink::AccessLogSink;

#[derive(Debug, Default)]
struct MemoryState {
    bytes: Vec<u8>,
    writes: u64,
    flushes: u64,
    rollovers: u64,
    closed: bool,

    /// Remaining writes that should fail
    failures: u32,
}

/// In-memory sink with a shared, cloneable view
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().bytes.clone()
    }

    /// Written bytes split into lines (lossy UTF-8, terminators removed)
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.state.lock().bytes)
            .lines()
            .map(str::to_owned)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().bytes.is_empty()
    }

    /// Successful `write` calls
    pub fn write_count(&self) -> u64 {
        self.state.lock().writes
    }

    pub fn flush_count(&self) -> u64 {
        self.state.lock().flushes
    }

    /// `rollover` calls (the memory sink never actually rotates)
    pub fn rollover_checks(&self) -> u64 {
        self.state.lock().rollovers
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Make the next `n` writes fail with an I/O error
    pub fn fail_next_writes(&self, n: u32) {
        self.state.lock().failures = n;
    }
}

impl AccessLogSink for MemorySink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "memory sink is closed"));
        }
        if state.failures > 0 {
            state.failures -= 1;
            return Err(io::Error::other("injected write failure"));
        }
        state.bytes.extend_from_slice(bytes);
        state.writes += 1;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.state.lock().flushes += 1;
        Ok(())
    }

    fn rollover(&mut self) -> io::Result<bool> {
        self.state.lock().rollovers += 1;
        Ok(false)
    }

    fn close(&mut self) -> io::Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_contents() {
        let view = MemorySink::new();
        let mut sink = view.clone();

        sink.write(b"a\nb\n").unwrap();
        assert_eq!(view.contents(), b"a\nb\n");
        assert_eq!(view.lines(), vec!["a", "b"]);
        assert_eq!(view.write_count(), 1);
    }

    #[test]
    fn test_injected_failures() {
        let view = MemorySink::new();
        let mut sink = view.clone();
        view.fail_next_writes(2);

        assert!(sink.write(b"x").is_err());
        assert!(sink.write(b"y").is_err());
        sink.write(b"z").unwrap();

        assert_eq!(view.contents(), b"z");
    }

    #[test]
    fn test_closed_sink_rejects_writes() {
        let view = MemorySink::new();
        let mut sink = view.clone();
        sink.close().unwrap();

        assert!(view.is_closed());
        assert!(sink.write(b"late").is_err());
        assert!(view.is_empty());
    }

    #[test]
    fn test_counts_flush_and_rollover() {
        let view = MemorySink::new();
        let mut sink = view.clone();

        sink.flush().unwrap();
        assert!(!sink.rollover().unwrap());
        assert!(!sink.rollover().unwrap());

        assert_eq!(view.flush_count(), 1);
        assert_eq!(view.rollover_checks(), 2);
    }
}
