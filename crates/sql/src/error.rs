//! SQL Layer Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A SQL-layer error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for SQL operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An identifier contained the escape delimiter (or ended in a
    /// backslash) and cannot be interpolated safely. Never retried.
    #[display("identifier rejected as an injection risk: {_0}")]
    InjectionRisk(#[error(not(source))] String),
    /// The storage engine rejected the statement for a reason other than
    /// a constraint (I/O, closed pool, malformed SQL, decode failure).
    #[display("database error")]
    Database,
    /// A uniqueness, foreign-key, not-null or check constraint fired.
    /// Callers may treat this as "already exists" for idempotent upserts.
    #[display("constraint violation")]
    Constraint,
    /// More than one row matched a key that must be unique. The schema
    /// is corrupt; surfaced, never retried.
    #[display("multiple rows share key: {_0}")]
    Ambiguous(#[error(not(source))] String),
    /// A key was required to be present but was not.
    #[display("key not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// A statement could not be built from the given input.
    #[display("invalid statement input: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Lock contention is surfaced as `Database` but retry policy
        // belongs to the caller, not this layer.
        false
    }
}
