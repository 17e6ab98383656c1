//! Relationship resolution between entity kinds.
//!
//! A single static table maps each unordered pair of kinds to the shape
//! its relationship is stored in. Two shapes exist:
//!
//! - **Junction** — a dedicated two-column table keyed by both foreign
//!   ids, optionally carrying extra data (a book's ordinal within a
//!   series).
//! - **Foreign key** — one kind's id lives in a column of a table that is
//!   keyed by the other kind's own id (a book's thumbnail reference on
//!   `books`, a review's book on `book_reviews`).
//!
//! The table is consulted by every operation here; no call site hardcodes
//! a junction table. It is plain static data: concurrent readers need no
//! locking.

use crate::entity::Entity;
use crate::error::{ErrorKind, Result, lift_sql};
use crate::kind::Kind;
use exn::{OptionExt, ResultExt};
use octavo_sql::{SqlBuilder, SqlValue, exec, row_pairs};

/// How a pair of kinds is bound together in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Both kinds own a column in a dedicated junction table.
    Junction {
        table: &'static str,
        columns: [(Kind, &'static str); 2],
        /// Auxiliary junction column updated on conflict (e.g. the
        /// position of a book within a series).
        extra: Option<&'static str>,
    },
    /// One kind's id is a column in a table keyed by the other kind's
    /// own id column.
    ForeignKey {
        table: &'static str,
        /// The kind whose id is stored, and the column storing it.
        column: (Kind, &'static str),
        /// The kind the table's rows belong to.
        keyed_by: Kind,
    },
}

fn junction(
    table: &'static str,
    a: (Kind, &'static str),
    b: (Kind, &'static str),
    extra: Option<&'static str>,
) -> Shape {
    Shape::Junction { table, columns: [a, b], extra }
}

fn foreign_key(table: &'static str, column: (Kind, &'static str), keyed_by: Kind) -> Shape {
    Shape::ForeignKey { table, column, keyed_by }
}

fn lookup(a: Kind, b: Kind) -> Option<Shape> {
    use Kind::*;
    Some(match (a, b) {
        (Book, Author) => junction("book_authors", (Book, "book_id"), (Author, "author_id"), None),
        (Book, Series) => {
            junction("book_series", (Book, "book_id"), (Series, "series_id"), Some("book_number"))
        },
        (Book, Tag) => junction("book_tags", (Book, "book_id"), (Tag, "tag_id"), None),
        (Book, BookFile) => junction("book_files", (Book, "book_id"), (BookFile, "file_id"), None),
        (User, Group) => junction("user_groups", (User, "user_id"), (Group, "group_id"), None),
        (Book, Thumbnail) => foreign_key("books", (Thumbnail, "thumbnail_id"), Book),
        (Book, BookReview) => foreign_key("book_reviews", (Book, "book_id"), BookReview),
        (Author, AuthorRating) => foreign_key("author_ratings", (Author, "author_id"), AuthorRating),
        (User, BookReview) => foreign_key("book_reviews", (User, "reviewed_by"), BookReview),
        (User, AuthorRating) => foreign_key("author_ratings", (User, "rated_by"), AuthorRating),
        (Barcode, User) => foreign_key("barcode_queue", (User, "user_id"), Barcode),
        _ => return None,
    })
}

/// The storage shape for an unordered pair of kinds, or
/// [`Incompatible`](ErrorKind::Incompatible) if no relationship exists
/// between them.
pub fn shape(a: Kind, b: Kind) -> Result<Shape> {
    lookup(a, b)
        .or_else(|| lookup(b, a))
        .ok_or_raise(|| ErrorKind::Incompatible(a.name(), b.name()))
}

/// Both entities must be persisted, clean, and share a database before a
/// relationship can be touched.
fn check_pair(a: &Entity, b: &Entity) -> Result<()> {
    if a.database() != b.database() {
        exn::bail!(ErrorKind::MixedDatabases);
    }
    if !a.saved() || !b.saved() {
        exn::bail!(ErrorKind::InvalidState("relationship change on unsaved entity"));
    }
    Ok(())
}

/// The id of whichever entity is the given kind.
fn id_of(kind: Kind, a: &Entity, b: &Entity) -> i64 {
    // check_pair has established both ids exist.
    match a.kind() == kind {
        true => a.id().expect("checked by check_pair"),
        false => b.id().expect("checked by check_pair"),
    }
}

/// The existence predicate for a pair under its resolved shape.
fn pair_predicate(shape: Shape, a: &Entity, b: &Entity) -> Vec<(&'static str, SqlValue)> {
    match shape {
        Shape::Junction { columns, .. } => columns
            .iter()
            .map(|(kind, column)| (*column, SqlValue::from(id_of(*kind, a, b))))
            .collect(),
        Shape::ForeignKey { column: (kind, column), keyed_by, .. } => vec![
            (column, SqlValue::from(id_of(kind, a, b))),
            (keyed_by.spec().id_column, SqlValue::from(id_of(keyed_by, a, b))),
        ],
    }
}

/// Whether the two entities are connected.
pub async fn is_connected(a: &Entity, b: &Entity) -> Result<bool> {
    check_pair(a, b)?;
    let shape = shape(a.kind(), b.kind())?;
    let table = match shape {
        Shape::Junction { table, .. } | Shape::ForeignKey { table, .. } => table,
    };
    let statement = SqlBuilder::new()
        .select(table, &["*"], &pair_predicate(shape, a, b), &[])
        .map_err(lift_sql)?;
    Ok(exec::fetch_optional(a.database().pool(), &statement).await.map_err(lift_sql)?.is_some())
}

/// Connect two entities, optionally with extra junction data.
///
/// Connecting an already-connected junction pair without extra data is a
/// no-op. With extra data, a uniqueness conflict on the junction row
/// falls back to updating the existing row's extra column — both
/// statements inside one transaction. Foreign-key shapes update the
/// owning table's column in place.
pub async fn connect(a: &Entity, b: &Entity, extra: Option<SqlValue>) -> Result<()> {
    if is_connected(a, b).await? && extra.is_none() {
        return Ok(());
    }
    let builder = SqlBuilder::new();
    match shape(a.kind(), b.kind())? {
        Shape::Junction { table, columns, extra: extra_column } => {
            let mut data: Vec<(&str, SqlValue)> = columns
                .iter()
                .map(|(kind, column)| (*column, SqlValue::from(id_of(*kind, a, b))))
                .collect();
            let carried = extra_column.zip(extra);
            if let Some((column, value)) = &carried {
                data.push((*column, value.clone()));
            }
            let insert = builder.insert(table, &data).map_err(lift_sql)?;

            let mut tx = a.database().pool().begin().await.or_raise(|| ErrorKind::Database)?;
            match exec::insert(&mut *tx, &insert).await {
                Ok(_) => {},
                Err(error) if matches!(&*error, octavo_sql::error::ErrorKind::Constraint) => {
                    // The junction row already exists: carry the extra
                    // data onto it, or surface the conflict untouched.
                    let Some((column, value)) = carried else {
                        return Err(lift_sql(error));
                    };
                    let predicate: Vec<(&str, SqlValue)> = columns
                        .iter()
                        .map(|(kind, col)| (*col, SqlValue::from(id_of(*kind, a, b))))
                        .collect();
                    let update =
                        builder.update(table, &[(column, value)], &predicate).map_err(lift_sql)?;
                    let affected = exec::execute(&mut *tx, &update).await.map_err(lift_sql)?;
                    if affected == 0 {
                        return Err(lift_sql(error));
                    }
                },
                Err(error) => return Err(lift_sql(error)),
            }
            tx.commit().await.or_raise(|| ErrorKind::Database)?;
            Ok(())
        },
        Shape::ForeignKey { table, column: (kind, column), keyed_by } => {
            let statement = builder
                .update(
                    table,
                    &[(column, SqlValue::from(id_of(kind, a, b)))],
                    &[(keyed_by.spec().id_column, SqlValue::from(id_of(keyed_by, a, b)))],
                )
                .map_err(lift_sql)?;
            exec::execute(a.database().pool(), &statement).await.map_err(lift_sql)?;
            Ok(())
        },
    }
}

/// Remove the connection between two entities, if any.
pub async fn disconnect(a: &Entity, b: &Entity) -> Result<()> {
    if !is_connected(a, b).await? {
        return Ok(());
    }
    let builder = SqlBuilder::new();
    match shape(a.kind(), b.kind())? {
        Shape::Junction { table, columns, .. } => {
            let predicate: Vec<(&str, SqlValue)> = columns
                .iter()
                .map(|(kind, column)| (*column, SqlValue::from(id_of(*kind, a, b))))
                .collect();
            let statement = builder.delete(table, &predicate).map_err(lift_sql)?;
            exec::execute(a.database().pool(), &statement).await.map_err(lift_sql)?;
            Ok(())
        },
        Shape::ForeignKey { table, column: (_, column), keyed_by } => {
            let statement = builder
                .update(
                    table,
                    &[(column, SqlValue::Null)],
                    &[(keyed_by.spec().id_column, SqlValue::from(id_of(keyed_by, a, b)))],
                )
                .map_err(lift_sql)?;
            exec::execute(a.database().pool(), &statement).await.map_err(lift_sql)?;
            Ok(())
        },
    }
}

/// The ids of every `kind` entity connected to `entity`.
pub async fn connected_ids(entity: &Entity, kind: Kind) -> Result<Vec<i64>> {
    if !entity.saved() {
        exn::bail!(ErrorKind::InvalidState("relationship query on unsaved entity"));
    }
    let entity_id = entity.id().expect("saved() checked");
    let shape = shape(entity.kind(), kind)?;

    // Resolve which column anchors this entity and which column (or id
    // column) holds the connected ids.
    let (table, own_column, target_column) = match shape {
        Shape::Junction { table, columns, .. } => {
            let own = columns.iter().find(|(k, _)| *k == entity.kind());
            let target = columns.iter().find(|(k, _)| *k == kind);
            (
                table,
                own.map(|(_, c)| *c).unwrap_or(entity.kind().spec().id_column),
                target.map(|(_, c)| *c).unwrap_or(kind.spec().id_column),
            )
        },
        Shape::ForeignKey { table, column: (mapped, column), keyed_by } => {
            let own = if mapped == entity.kind() { column } else { keyed_by.spec().id_column };
            let target = if mapped == kind { column } else { kind.spec().id_column };
            (table, own, target)
        },
    };

    let statement = SqlBuilder::new()
        .select(table, &[target_column], &[(own_column, SqlValue::from(entity_id))], &[])
        .map_err(lift_sql)?;
    let rows = exec::fetch_all(entity.database().pool(), &statement).await.map_err(lift_sql)?;
    let mut ids = Vec::with_capacity(rows.len());
    for row in rows {
        let Some((_, value)) = row_pairs(&row).map_err(lift_sql)?.into_iter().next() else {
            continue;
        };
        // A NULL foreign key means "not connected", not "connected to 0".
        if let Some(id) = value.as_integer() {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// One unhydrated handle per connected `kind` entity. With `order_by`,
/// every handle is hydrated and the result sorted by that field's value.
pub async fn connected(
    entity: &Entity,
    kind: Kind,
    order_by: Option<&str>,
    descending: bool,
) -> Result<Vec<Entity>> {
    let ids = connected_ids(entity, kind).await?;
    let mut handles: Vec<Entity> =
        ids.into_iter().map(|id| Entity::load(entity.database().clone(), kind, id)).collect();
    if let Some(field) = order_by {
        let mut keyed = Vec::with_capacity(handles.len());
        for mut handle in handles {
            let key = handle.field(field).await?;
            keyed.push((key, handle));
        }
        keyed.sort_by(|(x, _), (y, _)| x.sort_cmp(y));
        if descending {
            keyed.reverse();
        }
        handles = keyed.into_iter().map(|(_, handle)| handle).collect();
    }
    Ok(handles)
}

/// The ordinal of `book` within `series`, if the pair is connected and
/// an ordinal was recorded.
pub async fn position(series: &Entity, book: &Entity) -> Result<Option<i64>> {
    check_pair(series, book)?;
    if series.kind() != Kind::Series || book.kind() != Kind::Book {
        exn::bail!(ErrorKind::Incompatible(series.kind().name(), book.kind().name()));
    }
    let statement = SqlBuilder::new()
        .select(
            "book_series",
            &["book_number"],
            &[
                ("series_id", SqlValue::from(series.id().expect("checked by check_pair"))),
                ("book_id", SqlValue::from(book.id().expect("checked by check_pair"))),
            ],
            &[],
        )
        .map_err(lift_sql)?;
    let row = exec::fetch_optional(series.database().pool(), &statement).await.map_err(lift_sql)?;
    Ok(row
        .map(|row| row_pairs(&row).map_err(lift_sql))
        .transpose()?
        .and_then(|pairs| pairs.into_iter().next())
        .and_then(|(_, value)| value.as_integer()))
}
