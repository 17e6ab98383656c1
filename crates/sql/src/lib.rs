//! Dynamic SQL construction and execution for the octavo catalogue.
//!
//! SQL has no mechanism for parameterizing identifiers, so statements that
//! take table and column names from the caller must interpolate them as
//! text. This crate draws that line once: identifiers pass through
//! [`SqlBuilder`]'s escaping validation and are interpolated, values are
//! always bound positionally. Building is pure (a [`Statement`] is just SQL
//! text plus its parameters); execution happens against a `sqlx` SQLite
//! pool in the [`exec`] module.
//!
//! The [`KvStore`] on top of it provides map-like access to any
//! two-column (key, value) table, which the catalogue uses for application
//! settings and session records.

mod builder;
mod escape;
pub mod error;
pub mod exec;
mod kv;
mod value;

pub use crate::builder::{OrderBy, SqlBuilder, Statement};
pub use crate::kv::KvStore;
pub use crate::value::{SqlValue, row_pairs};

/// Ordered (column, value) pairs for data and predicate maps.
///
/// Iteration order determines placeholder order, so callers that build
/// these from maps must use a deterministically ordered map type.
pub type Pairs<'a> = &'a [(&'a str, SqlValue)];
