//! Entity-relational persistence core for the octavo library catalogue.
//!
//! Every domain record (book, author, series, user, …) is an [`Entity`]:
//! a typed handle backed by exactly one row in one table, hydrated lazily
//! on first field access and change-tracked so that saving writes only
//! what changed. Relationships between entities are resolved through a
//! static table keyed by the unordered pair of [`Kind`]s, which knows
//! whether a pair is stored as a two-column junction row or as a
//! foreign-key column on one participant's own table.
//!
//! The [`Catalogue`] facade composes these with domain lookups
//! (find-or-create, book-by-ISBN, suggestion search) over a [`Database`]
//! whose schema — tables, constraints, triggers and views — is created by
//! embedded migrations.

mod catalogue;
mod db;
mod entity;
pub mod error;
mod isbn;
mod kind;
pub mod relation;
mod text;

pub use crate::catalogue::Catalogue;
pub use crate::db::Database;
pub use crate::entity::Entity;
pub use crate::isbn::Isbn;
pub use crate::kind::{Kind, KindSpec};
pub use octavo_sql::SqlValue;
