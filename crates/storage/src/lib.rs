//! Content-keyed blob storage for the octavo catalogue.
//!
//! Maps an arbitrary application-chosen key (by convention `"<Kind>:<id>"`)
//! to a file on disk through a deterministic hash-derived path. The
//! directory tree is owned by the application and carries a sentinel README
//! saying so; paths are derived, never stored, so the store needs no index
//! of its own.

pub mod error;
mod store;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::store::BlobStore;
