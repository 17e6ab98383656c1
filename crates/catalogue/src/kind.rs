//! Entity kinds and their compile-time table declarations.
//!
//! The original system synthesized per-field accessors at class-setup
//! time; here every kind declares its field lists as a static table that
//! the shared hydrate/diff machinery in [`entity`](crate::entity)
//! consumes.

use derive_more::Display;

/// Every entity kind the catalogue persists.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Book,
    Author,
    Series,
    Tag,
    Group,
    User,
    Thumbnail,
    BookFile,
    BookReview,
    AuthorRating,
    Barcode,
}

/// Static declaration of how a kind maps onto its table.
#[derive(Debug)]
pub struct KindSpec {
    /// Backing table name.
    pub table: &'static str,
    /// Declared id column. May differ from the engine's rowid.
    pub id_column: &'static str,
    /// Scalar fields readable and writable through the generic accessors.
    pub fields: &'static [&'static str],
    /// Fields stored as integer epoch seconds, exposed as timestamps.
    pub date_fields: &'static [&'static str],
    /// Fields readable but not directly settable: derived by triggers or
    /// guarded by a validating setter (`set_isbn`).
    pub managed_fields: &'static [&'static str],
    /// Key offset for the opaque-id codec, so no two kinds share an
    /// encoding of the same row id.
    pub id_offset: u64,
}

impl Kind {
    pub const ALL: [Kind; 11] = [
        Kind::Book,
        Kind::Author,
        Kind::Series,
        Kind::Tag,
        Kind::Group,
        Kind::User,
        Kind::Thumbnail,
        Kind::BookFile,
        Kind::BookReview,
        Kind::AuthorRating,
        Kind::Barcode,
    ];

    pub const fn spec(self) -> &'static KindSpec {
        match self {
            Kind::Book => &KindSpec {
                table: "books",
                id_column: "id",
                fields: &[
                    "name",
                    "price",
                    "publisher",
                    "year",
                    "annotation",
                    "in_type",
                    "in_comment",
                    "out_type",
                    "out_comment",
                    "thumbnail_id",
                ],
                date_fields: &["in_date", "out_date", "last_edit"],
                managed_fields: &["isbn", "isbn_user"],
                id_offset: 0,
            },
            Kind::Author => &KindSpec {
                table: "authors",
                id_column: "id",
                fields: &["name"],
                date_fields: &[],
                managed_fields: &[],
                id_offset: 100,
            },
            Kind::Series => &KindSpec {
                table: "series",
                id_column: "id",
                fields: &["type", "name", "number_books"],
                date_fields: &[],
                managed_fields: &[],
                id_offset: 200,
            },
            Kind::Tag => &KindSpec {
                table: "tags",
                id_column: "id",
                fields: &["name"],
                date_fields: &[],
                managed_fields: &[],
                id_offset: 300,
            },
            Kind::Group => &KindSpec {
                table: "groups",
                id_column: "id",
                fields: &["name"],
                date_fields: &[],
                managed_fields: &[],
                id_offset: 400,
            },
            Kind::User => &KindSpec {
                table: "users",
                id_column: "id",
                fields: &["name", "hash", "fullname"],
                date_fields: &["created_on", "expires_on"],
                managed_fields: &[],
                id_offset: 500,
            },
            Kind::Thumbnail => &KindSpec {
                table: "thumbs",
                id_column: "id",
                fields: &["url", "image"],
                date_fields: &["last_edit"],
                managed_fields: &[],
                id_offset: 600,
            },
            Kind::BookFile => &KindSpec {
                table: "files",
                id_column: "id",
                fields: &["name", "type"],
                date_fields: &[],
                managed_fields: &[],
                id_offset: 700,
            },
            Kind::BookReview => &KindSpec {
                table: "book_reviews",
                id_column: "id",
                fields: &["book_id", "reviewed_by", "review", "rating"],
                date_fields: &["date"],
                managed_fields: &[],
                id_offset: 800,
            },
            Kind::AuthorRating => &KindSpec {
                table: "author_ratings",
                id_column: "id",
                fields: &["author_id", "rated_by", "value", "comment"],
                date_fields: &["date"],
                managed_fields: &[],
                id_offset: 900,
            },
            Kind::Barcode => &KindSpec {
                table: "barcode_queue",
                id_column: "id",
                fields: &["title", "user_id"],
                date_fields: &["date"],
                managed_fields: &["isbn"],
                id_offset: 1000,
            },
        }
    }

    /// The variant name, for error reporting.
    pub const fn name(self) -> &'static str {
        match self {
            Kind::Book => "Book",
            Kind::Author => "Author",
            Kind::Series => "Series",
            Kind::Tag => "Tag",
            Kind::Group => "Group",
            Kind::User => "User",
            Kind::Thumbnail => "Thumbnail",
            Kind::BookFile => "BookFile",
            Kind::BookReview => "BookReview",
            Kind::AuthorRating => "AuthorRating",
            Kind::Barcode => "Barcode",
        }
    }

    /// Whether `field` may be read through the generic accessors.
    pub fn declares(self, field: &str) -> bool {
        let spec = self.spec();
        spec.fields.contains(&field)
            || spec.date_fields.contains(&field)
            || spec.managed_fields.contains(&field)
    }

    /// Whether `field` may be written through the generic setter.
    pub fn settable(self, field: &str) -> bool {
        let spec = self.spec();
        spec.fields.contains(&field) || spec.date_fields.contains(&field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tables_and_offsets_are_unique() {
        let tables: HashSet<_> = Kind::ALL.iter().map(|k| k.spec().table).collect();
        assert_eq!(tables.len(), Kind::ALL.len());
        let offsets: HashSet<_> = Kind::ALL.iter().map(|k| k.spec().id_offset).collect();
        assert_eq!(offsets.len(), Kind::ALL.len());
    }

    #[test]
    fn test_field_declarations() {
        assert!(Kind::Book.declares("name"));
        assert!(Kind::Book.declares("in_date"));
        assert!(Kind::Book.declares("isbn"));
        assert!(!Kind::Book.settable("isbn"));
        assert!(!Kind::Book.declares("no_such_field"));
        assert!(Kind::Barcode.declares("isbn"));
        assert!(!Kind::Barcode.settable("isbn"));
        assert!(Kind::Thumbnail.settable("image"));
    }
}
