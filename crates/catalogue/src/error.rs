//! Catalogue Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A catalogue error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalogue operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The storage engine failed below this layer.
    #[display("database error")]
    Database,
    /// Schema migration failed.
    #[display("database migration error")]
    Migration,
    /// The row backing an entity does not exist (hydration or lookup
    /// miss). Recoverable: callers typically construct a fresh entity
    /// instead.
    #[display("no {kind} row with id {id}")]
    NotFound {
        #[error(not(source))]
        kind: &'static str,
        id: i64,
    },
    /// An operation was attempted on a deleted or not-yet-persisted
    /// entity. Programmer error; surfaced, never retried.
    #[display("entity unusable for {_0}")]
    InvalidState(#[error(not(source))] &'static str),
    /// A lookup that must match at most one row matched several. The
    /// schema's uniqueness constraint is missing or corrupt.
    #[display("more than one row matches {_0}")]
    Ambiguous(#[error(not(source))] String),
    /// A uniqueness, foreign-key or check constraint fired. Callers may
    /// treat this as "already exists" for idempotent upserts.
    #[display("constraint violation")]
    Constraint,
    /// A field name outside the entity kind's declared field list, or a
    /// managed field that cannot be set directly.
    #[display("unknown field: {_0}")]
    UnknownField(#[error(not(source))] String),
    /// The supplied text is not a valid ISBN.
    #[display("ISBN is not valid: {_0}")]
    InvalidIsbn(#[error(not(source))] String),
    /// The pair of entity kinds has no relationship shape.
    #[display("incompatible kinds: {_0}, {_1}")]
    Incompatible(#[error(not(source))] &'static str, #[error(not(source))] &'static str),
    /// The two entities belong to different backing databases.
    #[display("entities belong to different databases")]
    MixedDatabases,
    /// A stored value had an unexpected storage class.
    #[display("invalid stored data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Re-raise a SQL-layer error under this crate's taxonomy, keeping the
/// categories a caller can act on (constraint conflicts, duplicate keys)
/// and folding the rest into `Database`.
pub(crate) fn lift_sql(error: octavo_sql::error::Error) -> Error {
    let kind = match &*error {
        octavo_sql::error::ErrorKind::Constraint => ErrorKind::Constraint,
        octavo_sql::error::ErrorKind::Ambiguous(key) => ErrorKind::Ambiguous(key.clone()),
        _ => ErrorKind::Database,
    };
    exn::Exn::from(kind)
}
