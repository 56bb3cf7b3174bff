//! Rotating File Sink - access log files with rollover and archival
//!
//! Writes to a single active file and rolls it over when its time bucket ends
//! or it grows past a size limit. Rolled files are renamed next to the active
//! one with the bucket label as suffix, and the oldest archives are pruned
//! once `max_archives` is exceeded.
//!
//! # Directory Structure
//!
//! ```text
//! logs/
//! ├── access.log              # active file
//! ├── access.log.20250114     # daily archive
//! ├── access.log.20250115     # daily archive
//! └── access.log.20250115.1   # size rollover within the same day
//! ```
//!
//! The sink is driven by the access-log writer task, which calls
//! `rollover()` after every drain cycle. Checking is cheap: one bucket string
//! comparison and one size comparison.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::SinkError;
use crate::sink::AccessLogSink;
use crate::util::{ChainWrite, ChainWriter, Compression, DEFAULT_BUFFER_SIZE};

/// Default maximum active file size (1GB)
pub const DEFAULT_ROLLOVER_SIZE: u64 = 1024 * 1024 * 1024;

/// Time-based rollover period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RolloverPeriod {
    /// Roll over at the top of every hour
    Hourly,
    /// Roll over at local midnight (default)
    #[default]
    Daily,
    /// Roll over on the 1st of each month
    Monthly,
    /// Size-based rollover only
    Never,
}

impl RolloverPeriod {
    fn label_format(&self) -> Option<&'static str> {
        match self {
            RolloverPeriod::Hourly => Some("%Y%m%d.%H"),
            RolloverPeriod::Daily => Some("%Y%m%d"),
            RolloverPeriod::Monthly => Some("%Y%m"),
            RolloverPeriod::Never => None,
        }
    }

    /// Label of the time bucket containing `now`, `None` for `Never`
    pub fn bucket(&self, now: DateTime<Local>) -> Option<String> {
        self.label_format().map(|fmt| now.format(fmt).to_string())
    }
}

/// Configuration for the rotating file sink
#[derive(Debug, Clone)]
pub struct RotatingFileConfig {
    /// Active file path without extension (e.g. `logs/access`)
    pub path: PathBuf,

    /// Time-based rollover period
    pub period: RolloverPeriod,

    /// Roll over once the active file reaches this many bytes (0 disables)
    pub max_size: u64,

    /// Archived files to keep (0 keeps all)
    pub max_archives: usize,

    /// Compression for the active file
    pub compression: Compression,

    /// Write buffer size
    pub buffer_size: usize,
}

impl Default for RotatingFileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logs/access"),
            period: RolloverPeriod::Daily,
            max_size: DEFAULT_ROLLOVER_SIZE,
            max_archives: 0,
            compression: Compression::None,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl RotatingFileConfig {
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_period(mut self, period: RolloverPeriod) -> Self {
        self.period = period;
        self
    }

    #[must_use]
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub fn with_max_archives(mut self, max_archives: usize) -> Self {
        self.max_archives = max_archives;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

/// Rotating access log file
pub struct RotatingFileSink {
    config: RotatingFileConfig,

    /// Writer factory matching `config.compression`
    chain_writer: Box<dyn ChainWriter>,

    /// Path of the active file (config path + extension)
    active_path: PathBuf,

    /// Active writer, `None` once closed or after a failed reopen
    writer: Option<Box<dyn ChainWrite>>,

    /// Set by `close`; a closed sink never reopens
    closed: bool,

    /// Time bucket the active file belongs to
    bucket: Option<String>,

    rollovers: u64,
    name: String,
}

impl RotatingFileSink {
    /// Open (or append to) the active file
    pub fn open(config: RotatingFileConfig) -> Result<Self, SinkError> {
        Self::open_at(config, Local::now())
    }

    /// Open the active file as if the current time were `now`
    pub fn open_at(config: RotatingFileConfig, now: DateTime<Local>) -> Result<Self, SinkError> {
        if config.path.as_os_str().is_empty() {
            return Err(SinkError::config("log path must not be empty"));
        }

        let chain_writer = config.compression.chain_writer(config.buffer_size);
        let active_path = with_extension(&config.path, chain_writer.file_extension());

        if let Some(parent) = active_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| SinkError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let (writer, modified) =
            open_chain(chain_writer.as_ref(), &active_path).map_err(|source| SinkError::Open {
                path: active_path.clone(),
                source,
            })?;

        // A non-empty file left by a previous run belongs to the bucket it
        // was last written in, so the first check archives it correctly.
        let bucket = config.period.bucket(modified.unwrap_or(now));
        let name = active_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "access.log".into());

        tracing::info!(
            path = %active_path.display(),
            period = ?config.period,
            max_size = config.max_size,
            "opened access log file"
        );

        Ok(Self {
            config,
            chain_writer,
            active_path,
            writer: Some(writer),
            closed: false,
            bucket,
            rollovers: 0,
            name,
        })
    }

    /// Path of the active file
    pub fn active_path(&self) -> &Path {
        &self.active_path
    }

    /// Number of rollovers performed since open
    pub fn rollover_count(&self) -> u64 {
        self.rollovers
    }

    /// Bytes in the active file (uncompressed, including buffered bytes)
    pub fn current_size(&self) -> u64 {
        self.writer.as_ref().map_or(0, |w| w.bytes_written())
    }

    /// Roll over if the bucket containing `now` differs from the active
    /// file's bucket or the size limit was reached
    pub fn rollover_at(&mut self, now: DateTime<Local>) -> io::Result<bool> {
        if self.closed {
            return Ok(false);
        }
        if self.writer.is_none() {
            self.reopen(now)?;
        }

        let bucket_now = self.config.period.bucket(now);
        let period_ended = bucket_now.is_some() && bucket_now != self.bucket;
        let size_reached = self.config.max_size > 0 && self.current_size() >= self.config.max_size;

        if !period_ended && !size_reached {
            return Ok(false);
        }

        let label = match &self.bucket {
            Some(bucket) => bucket.clone(),
            None => now.format("%Y%m%d.%H%M%S").to_string(),
        };
        self.rotate(&label)?;
        self.bucket = bucket_now;
        Ok(true)
    }

    fn rotate(&mut self, label: &str) -> io::Result<()> {
        let had_data = self.current_size() > 0;

        if let Some(writer) = self.writer.take()
            && let Err(e) = writer.finish()
        {
            tracing::error!(path = %self.active_path.display(), error = %e, "failed to finish log file");
        }

        let archived = if had_data {
            let archive = self.next_archive_path(label);
            match fs::rename(&self.active_path, &archive) {
                Ok(()) => Some(archive),
                Err(e) => {
                    tracing::error!(
                        path = %self.active_path.display(),
                        archive = %archive.display(),
                        error = %e,
                        "failed to archive log file"
                    );
                    None
                }
            }
        } else {
            None
        };

        let (writer, _) = open_chain(self.chain_writer.as_ref(), &self.active_path)?;
        self.writer = Some(writer);
        self.rollovers += 1;

        if let Some(archive) = archived {
            tracing::info!(
                path = %self.active_path.display(),
                archive = %archive.display(),
                "log file rolled over"
            );
            self.prune_archives()?;
        }

        Ok(())
    }

    /// Open the active file again after a rotation left the sink without one
    fn reopen(&mut self, now: DateTime<Local>) -> io::Result<()> {
        if let Some(parent) = self.active_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let (writer, modified) = open_chain(self.chain_writer.as_ref(), &self.active_path)?;
        self.writer = Some(writer);
        self.bucket = self.config.period.bucket(modified.unwrap_or(now));

        tracing::info!(path = %self.active_path.display(), "reopened access log file");
        Ok(())
    }

    /// First free `<active>.<label>[.<n>]` path
    fn next_archive_path(&self, label: &str) -> PathBuf {
        let base = format!("{}.{}", self.name, label);
        let mut candidate = self.active_path.with_file_name(&base);
        let mut n = 1;
        while candidate.exists() {
            candidate = self.active_path.with_file_name(format!("{base}.{n}"));
            n += 1;
        }
        candidate
    }

    /// Archives of the active file, oldest first
    pub fn archives(&self) -> io::Result<Vec<PathBuf>> {
        let dir = match self.active_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let prefix = format!("{}.", self.name);

        let mut found = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let is_archive = file_name
                .strip_prefix(&prefix)
                .is_some_and(is_archive_suffix);
            if !is_archive {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            found.push((modified, entry.path()));
        }

        found.sort();
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }

    fn prune_archives(&self) -> io::Result<()> {
        if self.config.max_archives == 0 {
            return Ok(());
        }

        let archives = self.archives()?;
        let excess = archives.len().saturating_sub(self.config.max_archives);
        for path in archives.into_iter().take(excess) {
            fs::remove_file(&path)?;
            tracing::debug!(archive = %path.display(), "removed old log archive");
        }
        Ok(())
    }

    fn active_writer(&mut self) -> io::Result<&mut Box<dyn ChainWrite>> {
        if self.writer.is_none() && !self.closed {
            self.reopen(Local::now())?;
        }
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "log file is closed"))
    }
}

impl AccessLogSink for RotatingFileSink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.active_writer()?.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.active_writer()?.flush_all()
    }

    fn rollover(&mut self) -> io::Result<bool> {
        self.rollover_at(Local::now())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        match self.writer.take() {
            Some(writer) => {
                tracing::debug!(path = %self.active_path.display(), "closing access log file");
                writer.finish()
            }
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn with_extension(path: &Path, extension: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(extension);
    PathBuf::from(os)
}

/// Bucket label plus optional collision counter: digits and dots only
fn is_archive_suffix(suffix: &str) -> bool {
    suffix.starts_with(|c: char| c.is_ascii_digit())
        && suffix.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

/// Open `path` for append and wrap it; also reports the last modification
/// time when the file already held data
fn open_chain(
    chain_writer: &dyn ChainWriter,
    path: &Path,
) -> io::Result<(Box<dyn ChainWrite>, Option<DateTime<Local>>)> {
    let file = File::options().create(true).append(true).open(path)?;
    let metadata = file.metadata()?;
    let modified = if metadata.len() > 0 {
        metadata.modified().ok().map(DateTime::<Local>::from)
    } else {
        None
    };
    let writer = chain_writer.wrap(file, metadata.len())?;
    Ok((writer, modified))
}
