use std::io;

/// Destination for rendered access-log records
///
/// Implementations receive whole records (one or more complete lines) in the
/// order the pipeline drained them. Rollover and archival policy belong to the
/// sink: the writer only asks `rollover()` after each drain cycle and lets the
/// sink decide whether anything needs to happen.
pub trait AccessLogSink: Send {
    /// Write a slice of complete log lines
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Push buffered bytes down to the destination
    fn flush(&mut self) -> io::Result<()>;

    /// Rotate the destination if its policy says so
    ///
    /// Returns `true` when a rotation happened.
    fn rollover(&mut self) -> io::Result<bool>;

    /// Flush and release the destination. Further writes are errors.
    fn close(&mut self) -> io::Result<()>;

    /// Short name used in diagnostics
    fn name(&self) -> &str;
}

impl<S: AccessLogSink + ?Sized> AccessLogSink for Box<S> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn rollover(&mut self) -> io::Result<bool> {
        (**self).rollover()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
