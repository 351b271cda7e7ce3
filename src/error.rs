//! Error types surfaced by the edit engine and validator.
//!
//! Query operations (`get`) never return an error: a miss, a malformed path,
//! or a blown resource limit all collapse to `Value::Null`. Only operations
//! that would otherwise silently produce a surprising document — `set`,
//! `set_raw`, `delete`, `valid` — surface errors.

use std::fmt;

/// A 1-based source location used by the validator and by `set_raw`'s
/// well-formedness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Errors produced by edit operations and the validator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input document exceeds [`crate::limits::MAX_DOCUMENT_SIZE`].
    #[error("document of {size} bytes exceeds the maximum of {max} bytes")]
    DocumentTooLarge { size: usize, max: usize },

    /// The compiled path would exceed [`crate::limits::MAX_PATH_SEGMENTS`].
    #[error("path has too many segments (limit is {max})")]
    PathTooLong { max: usize },

    /// The path text could not be compiled (unknown operator, unclosed
    /// quote, NUL or control byte).
    #[error("malformed path: {reason}")]
    MalformedPath { reason: String },

    /// `set_raw`'s fragment failed the well-formedness check.
    #[error("invalid XML fragment at {location}: {message}")]
    InvalidFragment { location: Location, message: String },

    /// The document failed validation at the given location.
    #[error("malformed document at {location}: {message}")]
    Malformed { location: Location, message: String },
}

impl Error {
    pub(crate) fn malformed_path(reason: impl Into<String>) -> Self {
        Error::MalformedPath {
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the edit engine and validator.
pub type Result<T> = std::result::Result<T, Error>;
