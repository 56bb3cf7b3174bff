//! Log format compiler
//!
//! Parses an Apache-style format string once into a flat list of segments
//! the renderer walks for every request.
//!
//! # Directives
//!
//! | Directive | Output |
//! |-----------|--------|
//! | `%h` | remote host |
//! | `%l` | remote logname (always `-`) |
//! | `%u` | remote user, quoted |
//! | `%t` / `%{pattern}t` | request time |
//! | `%r` | request line |
//! | `%s` | status |
//! | `%b` | content length |
//! | `%{name}i` | request header |
//! | `%{name}o` | response header (`Set-Cookie` prints the first cookie) |
//! | `%{name}n` | request attribute |
//! | `%{name}c` | cookie |
//! | `%T` / `%D` | elapsed seconds / microseconds |
//! | `%v` | server name |
//! | `%U` | request path |
//!
//! `%>s` is accepted as a synonym of `%s` (the `>` is ignored for every
//! directive). A bare `%` followed by anything else is copied literally.

use chrono::format::{Item, StrftimeItems};

use crate::error::FormatError;

/// Apache combined log format
pub const DEFAULT_FORMAT: &str = r#"%h %l %u %t "%r" %>s %b "%{Referer}i" "%{User-Agent}i""#;

/// One compiled unit of a format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal bytes
    Text(Box<[u8]>),
    /// Single literal byte
    Char(u8),
    Field(Field),
    /// `%{Set-Cookie}o`
    SetCookie,
}

/// A directive taking its value from the exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    RemoteHost,
    RemoteLogname,
    RemoteUser,
    /// Request time, optionally with its own strftime pattern
    Time(Option<Box<str>>),
    RequestLine,
    Status,
    ContentLength,
    RequestHeader(Box<str>),
    ResponseHeader(Box<str>),
    Attribute(Box<str>),
    Cookie(Box<str>),
    ElapsedSeconds,
    ElapsedMicros,
    ServerName,
    RequestUri,
}

impl Field {
    /// Directive character
    pub fn code(&self) -> char {
        match self {
            Field::RemoteHost => 'h',
            Field::RemoteLogname => 'l',
            Field::RemoteUser => 'u',
            Field::Time(_) => 't',
            Field::RequestLine => 'r',
            Field::Status => 's',
            Field::ContentLength => 'b',
            Field::RequestHeader(_) => 'i',
            Field::ResponseHeader(_) => 'o',
            Field::Attribute(_) => 'n',
            Field::Cookie(_) => 'c',
            Field::ElapsedSeconds => 'T',
            Field::ElapsedMicros => 'D',
            Field::ServerName => 'v',
            Field::RequestUri => 'U',
        }
    }

    /// The `{param}` the directive was compiled with
    pub fn param(&self) -> Option<&str> {
        match self {
            Field::Time(pattern) => pattern.as_deref(),
            Field::RequestHeader(name)
            | Field::ResponseHeader(name)
            | Field::Attribute(name)
            | Field::Cookie(name) => Some(name),
            _ => None,
        }
    }
}

/// Compile a format string
///
/// The result always ends with a `Text` segment holding the line
/// terminator.
pub fn compile(format: &str) -> Result<Vec<Segment>, FormatError> {
    let bytes = format.as_bytes();
    let mut segments = Vec::new();
    let mut text = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        i += 1;

        if b != b'%' || i >= bytes.len() {
            text.push(b);
            continue;
        }

        let position = i - 1;
        let mut param = None;
        let mut modified = false;
        let mut code = bytes[i];
        i += 1;

        if code == b'>' {
            modified = true;
            code = *bytes
                .get(i)
                .ok_or(FormatError::MissingDirective { position })?;
            i += 1;
        } else if code == b'{' {
            modified = true;
            let rest = &format[i..];
            let end = rest
                .find('}')
                .ok_or(FormatError::UnterminatedParameter { position })?;
            param = Some(&rest[..end]);
            i += end + 1;
            code = *bytes
                .get(i)
                .ok_or(FormatError::MissingDirective { position })?;
            i += 1;
        }

        match directive(code, param, position)? {
            Some(segment) => {
                push_text(&mut segments, &mut text);
                segments.push(segment);
            }
            None if !modified => {
                // Not a directive: keep the '%' and rescan from the next byte
                text.push(b'%');
                i -= 1;
            }
            None => {
                let directive = format[i - 1..].chars().next().unwrap_or('?');
                return Err(FormatError::UnknownDirective {
                    directive,
                    position,
                });
            }
        }
    }

    text.push(b'\n');
    segments.push(Segment::Text(text.into_boxed_slice()));
    Ok(segments)
}

fn push_text(segments: &mut Vec<Segment>, text: &mut Vec<u8>) {
    match text.len() {
        0 => {}
        1 => segments.push(Segment::Char(text[0])),
        _ => segments.push(Segment::Text(std::mem::take(text).into_boxed_slice())),
    }
    text.clear();
}

fn directive(code: u8, param: Option<&str>, position: usize) -> Result<Option<Segment>, FormatError> {
    let named = |param: Option<&str>| -> Result<Box<str>, FormatError> {
        match param {
            Some(name) if !name.is_empty() => Ok(name.into()),
            _ => Err(FormatError::MissingParameter {
                directive: code as char,
                position,
            }),
        }
    };

    let field = match code {
        b'h' => Field::RemoteHost,
        b'l' => Field::RemoteLogname,
        b'u' => Field::RemoteUser,
        b't' => match param {
            Some(pattern) if !pattern.is_empty() => {
                validate_time_pattern(pattern)?;
                Field::Time(Some(pattern.into()))
            }
            _ => Field::Time(None),
        },
        b'r' => Field::RequestLine,
        b's' => Field::Status,
        b'b' => Field::ContentLength,
        b'i' => Field::RequestHeader(named(param)?),
        b'o' => {
            let name = named(param)?;
            if name.eq_ignore_ascii_case("Set-Cookie") {
                return Ok(Some(Segment::SetCookie));
            }
            Field::ResponseHeader(name)
        }
        b'n' => Field::Attribute(named(param)?),
        b'c' => Field::Cookie(named(param)?),
        b'T' => Field::ElapsedSeconds,
        b'D' => Field::ElapsedMicros,
        b'v' => Field::ServerName,
        b'U' => Field::RequestUri,
        _ => return Ok(None),
    };

    Ok(Some(Segment::Field(field)))
}

/// Reject strftime patterns chrono would fail to format
pub(crate) fn validate_time_pattern(pattern: &str) -> Result<(), FormatError> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(FormatError::InvalidTimePattern {
            pattern: pattern.to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "format_test.rs"]
mod format_test;
