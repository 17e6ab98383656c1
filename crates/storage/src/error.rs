//! Blob Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The store root is not a usable directory.
    #[display("invalid blob store root: {}", _0.display())]
    InvalidRoot(#[error(not(source))] PathBuf),
    /// No blob is stored under the given key.
    #[display("no blob stored for key: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The input stream exceeded the configured size cap. The partial
    /// file has already been removed.
    #[display("blob exceeds {limit} bytes")]
    TooLarge {
        #[error(not(source))]
        limit: u64,
    },
    /// Filesystem failure.
    #[display("i/o error")]
    Io(std::io::Error),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io(_))
    }
}
