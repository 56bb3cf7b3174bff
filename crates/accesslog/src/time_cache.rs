//! Cached rendering of the `%t` field
//!
//! Formatting a timestamp with chrono on every request is the most expensive
//! part of a log line. The cache keeps the last rendered bytes and:
//!
//! - returns them unchanged within the same second
//! - patches only the minute and second digits within the same local hour,
//!   when the pattern ends with `%M:%S`
//! - re-renders fully otherwise
//!
//! One mutex guards the read-modify-write, readers copy the bytes out while
//! holding it.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, FixedOffset, Local, Offset, Timelike, Utc};
use parking_lot::Mutex;

use crate::error::FormatError;
use crate::format::validate_time_pattern;

/// Apache-style bracketed timestamp
pub const DEFAULT_TIME_FORMAT: &str = "[%d/%b/%Y:%H:%M:%S %z]";

/// Zone timestamps are rendered in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogTimeZone {
    /// The host's local zone, offset re-read on each full render
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl LogTimeZone {
    pub fn utc() -> Self {
        LogTimeZone::Fixed(Utc.fix())
    }

    fn at(&self, second: i64) -> DateTime<FixedOffset> {
        let utc = DateTime::<Utc>::from_timestamp(second, 0).unwrap_or_default();
        match self {
            LogTimeZone::Local => utc.with_timezone(&Local).fixed_offset(),
            LogTimeZone::Fixed(offset) => utc.with_timezone(offset),
        }
    }
}

#[derive(Debug, Default)]
struct TimeState {
    bytes: Vec<u8>,

    /// Unix second `bytes` represents
    second: Option<i64>,

    /// UTC offset of the last full render
    offset_secs: i64,

    /// Local hour index of the last full render
    hour: i64,

    /// Byte offset of the minute digits (seconds at +3)
    minute_at: Option<usize>,
}

/// Snapshot of cache activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeCacheStats {
    pub full_renders: u64,
    pub patches: u64,
}

/// Formats the current time, reusing the previous rendering when possible
#[derive(Debug)]
pub struct TimeCache {
    pattern: Box<str>,
    zone: LogTimeZone,

    /// Pattern ends with `%M:%S` and nothing else depends on them
    patchable: bool,

    state: Mutex<TimeState>,
    full_renders: AtomicU64,
    patches: AtomicU64,
}

impl TimeCache {
    pub fn new(pattern: &str, zone: LogTimeZone) -> Result<Self, FormatError> {
        validate_time_pattern(pattern)?;
        Ok(Self {
            pattern: pattern.into(),
            zone,
            patchable: is_patchable(pattern),
            state: Mutex::new(TimeState::default()),
            full_renders: AtomicU64::new(0),
            patches: AtomicU64::new(0),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn zone(&self) -> LogTimeZone {
        self.zone
    }

    /// Whether minute/second patching applies to this pattern
    pub fn is_patchable(&self) -> bool {
        self.patchable
    }

    /// Render `now` and hand the bytes to `f` while the cache is locked
    pub fn with_bytes<R>(&self, now: SystemTime, f: impl FnOnce(&[u8]) -> R) -> R {
        let second = unix_millis(now).div_euclid(1000);
        let mut state = self.state.lock();

        if state.second != Some(second) {
            if !self.try_patch(&mut state, second) {
                self.render_full(&mut state, second);
            }
            state.second = Some(second);
        }

        f(&state.bytes)
    }

    /// Owned copy of the rendering of `now`
    pub fn format(&self, now: SystemTime) -> Vec<u8> {
        self.with_bytes(now, <[u8]>::to_vec)
    }

    pub fn stats(&self) -> TimeCacheStats {
        TimeCacheStats {
            full_renders: self.full_renders.load(Ordering::Relaxed),
            patches: self.patches.load(Ordering::Relaxed),
        }
    }

    fn try_patch(&self, state: &mut TimeState, second: i64) -> bool {
        let Some(at) = state.minute_at else {
            return false;
        };
        if state.second.is_none() {
            return false;
        }

        let local = second + state.offset_secs;
        if local.div_euclid(3600) != state.hour {
            return false;
        }

        let minute = local.div_euclid(60).rem_euclid(60) as u8;
        let sec = local.rem_euclid(60) as u8;
        state.bytes[at] = b'0' + minute / 10;
        state.bytes[at + 1] = b'0' + minute % 10;
        state.bytes[at + 3] = b'0' + sec / 10;
        state.bytes[at + 4] = b'0' + sec % 10;

        self.patches.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn render_full(&self, state: &mut TimeState, second: i64) {
        let time = self.zone.at(second);

        state.bytes.clear();
        if write!(state.bytes, "{}", time.format(&self.pattern)).is_err() {
            state.bytes.clear();
            state.bytes.push(b'-');
        }

        state.offset_secs = i64::from(time.offset().local_minus_utc());
        state.hour = (second + state.offset_secs).div_euclid(3600);
        state.minute_at = if self.patchable {
            locate_minutes(&state.bytes, time.minute(), time.second())
        } else {
            None
        };

        self.full_renders.fetch_add(1, Ordering::Relaxed);
    }
}

fn unix_millis(now: SystemTime) -> i64 {
    match now.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_millis()).unwrap_or(i64::MAX),
    }
}

/// Find `MM:SS` around the last ':' and check it holds the expected digits
fn locate_minutes(bytes: &[u8], minute: u32, second: u32) -> Option<usize> {
    let colon = bytes.iter().rposition(|&b| b == b':')?;
    let at = colon.checked_sub(2)?;
    if colon + 2 >= bytes.len() {
        return None;
    }

    let digits = |i: usize| -> Option<u32> {
        let (hi, lo) = (bytes[i], bytes[i + 1]);
        (hi.is_ascii_digit() && lo.is_ascii_digit())
            .then(|| u32::from(hi - b'0') * 10 + u32::from(lo - b'0'))
    };

    (digits(at)? == minute && digits(colon + 1)? == second).then_some(at)
}

/// A pattern can be patched when its only minute and second output is a
/// trailing `%M:%S` pair and nothing after that pair prints a ':'
fn is_patchable(pattern: &str) -> bool {
    let items = specifiers(pattern);

    let Some(pair) = pattern.rfind("%M:%S") else {
        return false;
    };
    // "%%M:%S" is a literal
    if items.iter().all(|s| s.start != pair) {
        return false;
    }
    let after = pair + "%M:%S".len();

    for item in &items {
        if item.start == pair || item.start == pair + 3 {
            continue;
        }
        // Anything else that moves with the minute or second
        if matches!(item.conversion, 'M' | 'S' | 's' | 'T' | 'R' | 'X' | 'c' | 'r' | '+' | 'f') {
            return false;
        }
        // %Z prints "+00:00" for fixed offsets
        if item.start >= after && (item.colon || item.conversion == 'Z') {
            return false;
        }
    }

    // Literal ':' after the pair would move the last colon
    let mut literal_after = String::new();
    let mut cursor = after;
    for item in items.iter().filter(|s| s.start >= after) {
        literal_after.push_str(&pattern[cursor..item.start]);
        cursor = item.end;
    }
    literal_after.push_str(&pattern[cursor.min(pattern.len())..]);
    !literal_after.contains(':')
}

struct Specifier {
    start: usize,
    end: usize,
    conversion: char,
    colon: bool,
}

/// Locate `%` specifiers: `%`, flags/width/precision/colons, conversion
fn specifiers(pattern: &str) -> Vec<Specifier> {
    let mut found = Vec::new();
    let mut chars = pattern.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '%' {
            continue;
        }
        let mut colon = false;
        while let Some(&(_, m)) = chars.peek() {
            if matches!(m, '-' | '_' | '0'..='9' | '.' | '#' | '^') {
                chars.next();
            } else if m == ':' {
                colon = true;
                chars.next();
            } else {
                break;
            }
        }
        if let Some((idx, conversion)) = chars.next()
            && conversion != '%'
        {
            found.push(Specifier {
                start,
                end: idx + conversion.len_utf8(),
                conversion,
                colon,
            });
        }
    }

    found
}

#[cfg(test)]
#[path = "time_cache_test.rs"]
mod time_cache_test;
