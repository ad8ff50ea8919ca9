//! Error types for the ragzip container format and engine.
//!
//! Mirrors the five error kinds laid out by the format's error-handling
//! design: configuration, format, integrity, capacity, and concurrency
//! errors. Each is a hand-rolled variant with a manual `Display` + `Error`
//! impl rather than a derive-macro error crate, matching the house style of
//! a straightforward `Display`-then-`std::error::Error` pair.

use std::fmt;
use std::io;

/// Result alias used throughout the `ragzip` crate.
pub type Result<T> = std::result::Result<T, RagzipError>;

/// Errors produced while building, reading, or seeking a ragzip container.
#[derive(Debug)]
pub enum RagzipError {
    /// Invalid `P`/`I` parameters, mismatched resume parameters, or any
    /// other input rejected before any I/O takes place.
    Configuration(String),
    /// A structural problem in the container itself: missing `RA` subfield,
    /// bad gzip magic, a non-monotone offset in an index or extension chain,
    /// an unsupported version, or a footer that isn't exactly 64 bytes.
    /// `offset` is the byte position of the offending member, when known.
    Format { message: String, offset: Option<u64> },
    /// A gzip CRC/ISIZE mismatch, an inflate stream error, or premature EOF
    /// inside a member. `position` is the decompressor's byte position.
    Integrity { message: String, position: Option<u64> },
    /// A capacity ceiling from the format's invariants would be exceeded:
    /// uncompressed size reaching 2^62, more than 50 extensions, or an
    /// extension payload over 32 KiB.
    Capacity(String),
    /// A parallel pipeline stage failed; `cause` is that stage's error,
    /// preserved so callers can inspect the root failure.
    Concurrency {
        message: String,
        cause: Box<RagzipError>,
    },
    /// Wraps an underlying I/O error from the byte source/sink.
    Io(io::Error),
}

impl fmt::Display for RagzipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RagzipError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            RagzipError::Format { message, offset: Some(o) } => {
                write!(f, "format error at offset {o}: {message}")
            }
            RagzipError::Format { message, offset: None } => {
                write!(f, "format error: {message}")
            }
            RagzipError::Integrity { message, position: Some(p) } => {
                write!(f, "integrity error at position {p}: {message}")
            }
            RagzipError::Integrity { message, position: None } => {
                write!(f, "integrity error: {message}")
            }
            RagzipError::Capacity(msg) => write!(f, "capacity error: {msg}"),
            RagzipError::Concurrency { message, cause } => {
                write!(f, "pipeline stage failed: {message} (caused by: {cause})")
            }
            RagzipError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for RagzipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RagzipError::Concurrency { cause, .. } => Some(cause.as_ref()),
            RagzipError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RagzipError {
    fn from(e: io::Error) -> Self {
        RagzipError::Io(e)
    }
}

impl RagzipError {
    pub fn format<S: Into<String>>(message: S) -> Self {
        RagzipError::Format { message: message.into(), offset: None }
    }

    pub fn format_at<S: Into<String>>(message: S, offset: u64) -> Self {
        RagzipError::Format { message: message.into(), offset: Some(offset) }
    }

    pub fn integrity<S: Into<String>>(message: S) -> Self {
        RagzipError::Integrity { message: message.into(), position: None }
    }

    pub fn integrity_at<S: Into<String>>(message: S, position: u64) -> Self {
        RagzipError::Integrity { message: message.into(), position: Some(position) }
    }

    pub fn concurrency<S: Into<String>>(message: S, cause: RagzipError) -> Self {
        RagzipError::Concurrency { message: message.into(), cause: Box::new(cause) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_error_with_offset_displays_offset() {
        let e = RagzipError::format_at("missing RA subfield", 128);
        assert!(e.to_string().contains("offset 128"));
    }

    #[test]
    fn io_error_round_trips_via_from() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let e: RagzipError = io_err.into();
        assert!(matches!(e, RagzipError::Io(_)));
    }

    #[test]
    fn concurrency_error_preserves_cause_as_source() {
        use std::error::Error as _;
        let cause = RagzipError::Capacity("too many extensions".into());
        let e = RagzipError::concurrency("zipper panicked", cause);
        assert!(e.source().is_some());
    }
}
