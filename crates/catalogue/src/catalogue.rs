//! Domain operations composed over the database, entities and stores.

use crate::db::Database;
use crate::entity::Entity;
use crate::error::{ErrorKind, Result, lift_sql};
use crate::isbn::Isbn;
use crate::kind::Kind;
use crate::text;
use futures::StreamExt;
use octavo_ids::Codec;
use octavo_sql::{KvStore, OrderBy, SqlBuilder, SqlValue, exec, row_pairs};
use tracing::debug;

/// Rows fetched per chunk while scanning suggestion candidates.
const SUGGESTION_CHUNK: usize = 500;

/// The catalogue facade: find-or-create lookups, book resolution by id or
/// ISBN, suggestion search, and handles to the key-value collaborator
/// interfaces.
#[derive(Debug, Clone)]
pub struct Catalogue {
    db: Database,
    builder: SqlBuilder,
    id_secret: u64,
}

impl Catalogue {
    /// Wrap a connected database. `id_secret` keys the opaque-id codecs
    /// handed to the URL layer.
    pub fn new(db: Database, id_secret: u64) -> Self {
        Self { db, builder: SqlBuilder::new(), id_secret }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// A fresh, unsaved entity of the given kind.
    pub fn create(&self, kind: Kind) -> Entity {
        Entity::create(self.db.clone(), kind)
    }

    /// An unhydrated handle for a known row id.
    pub fn entity(&self, kind: Kind, id: i64) -> Entity {
        Entity::load(self.db.clone(), kind, id)
    }

    /// Look an entity up by one field value, creating (but not saving) it
    /// on a miss.
    ///
    /// Zero matches return a fresh entity with `field` pre-set to
    /// `value`; exactly one match returns a hydrated handle; more than
    /// one fails with [`Ambiguous`](ErrorKind::Ambiguous) — the schema's
    /// uniqueness constraint should have made that impossible.
    pub async fn find_or_create(&self, kind: Kind, field: &str, value: SqlValue) -> Result<Entity> {
        let spec = kind.spec();
        let statement = self
            .builder
            .select(spec.table, &["*"], &[(field, value.clone())], &[])
            .map_err(lift_sql)?;
        let mut rows = exec::fetch_all(self.db.pool(), &statement).await.map_err(lift_sql)?;
        match rows.len() {
            0 => {
                let mut entity = self.create(kind);
                entity.set_field(field, value).await?;
                Ok(entity)
            },
            1 => {
                let data: std::collections::BTreeMap<String, SqlValue> =
                    row_pairs(&rows.remove(0)).map_err(lift_sql)?.into_iter().collect();
                let id = data
                    .get(spec.id_column)
                    .and_then(SqlValue::as_integer)
                    .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidData("id column")))?;
                Ok(Entity::from_row(self.db.clone(), kind, id, data))
            },
            matches => {
                debug!(kind = kind.name(), field, matches, "duplicate rows for unique lookup");
                exn::bail!(ErrorKind::Ambiguous(format!("{}.{field}", spec.table)))
            },
        }
    }

    /// Author by name; a fresh entity when the name is unknown.
    pub async fn author(&self, name: &str) -> Result<Entity> {
        self.find_or_create(Kind::Author, "name", SqlValue::from(name)).await
    }

    /// Series by name; a fresh entity when the name is unknown.
    pub async fn series(&self, name: &str) -> Result<Entity> {
        self.find_or_create(Kind::Series, "name", SqlValue::from(name)).await
    }

    /// Tag by name; a fresh entity when the name is unknown.
    pub async fn tag(&self, name: &str) -> Result<Entity> {
        self.find_or_create(Kind::Tag, "name", SqlValue::from(name)).await
    }

    /// Group by name; a fresh entity when the name is unknown.
    pub async fn group(&self, name: &str) -> Result<Entity> {
        self.find_or_create(Kind::Group, "name", SqlValue::from(name)).await
    }

    /// Resolve a book by id, else by ISBN, else return a fresh book.
    ///
    /// The ISBN is compared in normalized form against the derived clean
    /// column, so formatting differences don't matter.
    pub async fn book(&self, id: Option<i64>, isbn: Option<&str>) -> Result<Entity> {
        let spec = Kind::Book.spec();
        let predicate = match (id, isbn) {
            (Some(id), _) => Some((spec.id_column, SqlValue::from(id))),
            (None, Some(raw)) => Isbn::new(raw).number().map(|n| ("isbn", SqlValue::from(n))),
            (None, None) => None,
        };
        if let Some(predicate) = predicate {
            let statement = self
                .builder
                .select(spec.table, &[spec.id_column], &[predicate], &[])
                .map_err(lift_sql)?;
            if let Some(row) = exec::fetch_optional(self.db.pool(), &statement).await.map_err(lift_sql)? {
                let id = row_pairs(&row)
                    .map_err(lift_sql)?
                    .into_iter()
                    .next()
                    .and_then(|(_, value)| value.as_integer())
                    .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidData("id column")))?;
                return Ok(self.entity(Kind::Book, id));
            }
        }
        Ok(self.create(Kind::Book))
    }

    /// Distinct values of `column` starting (case- and
    /// punctuation-insensitively) with `prefix`, ascending, at most
    /// `limit` of them. A blank prefix suggests nothing.
    ///
    /// `table` and `column` are caller-supplied identifiers (views
    /// included) and go through the statement builder's escaping.
    pub async fn suggestions(&self, prefix: &str, table: &str, column: &str, limit: usize) -> Result<Vec<String>> {
        let wanted = text::simplify(prefix);
        if wanted.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let statement = self
            .builder
            .select_distinct(table, &[column], &[], &[OrderBy::asc(column)])
            .map_err(lift_sql)?;
        let mut suggestions = Vec::new();
        // The candidate set is scanned lazily: normalization can't be
        // pushed into SQL, but chunked iteration keeps the scan bounded
        // by how rare the prefix is.
        let mut rows = exec::iterate(self.db.pool(), statement, -1, SUGGESTION_CHUNK);
        while let Some(row) = rows.next().await {
            let row = row.map_err(lift_sql)?;
            let Some((_, value)) = row_pairs(&row).map_err(lift_sql)?.into_iter().next() else {
                continue;
            };
            let Some(candidate) = value.as_text() else {
                continue;
            };
            if text::simplify(candidate).starts_with(&wanted) {
                suggestions.push(candidate.to_string());
                if suggestions.len() >= limit {
                    break;
                }
            }
        }
        Ok(suggestions)
    }

    /// Application settings: the key-value interface over `app_config`.
    pub fn settings(&self) -> KvStore {
        KvStore::new(self.db.pool().clone(), "app_config", "option", "value")
    }

    /// Session records: the key-value interface over `sessions`.
    pub fn sessions(&self) -> KvStore {
        KvStore::new(self.db.pool().clone(), "sessions", "cookie", "session")
    }

    /// The opaque-id codec for one entity kind, for the URL layer.
    /// Per-kind key offsets keep the string forms of different kinds
    /// disjoint even for equal row ids.
    pub fn opaque(&self, kind: Kind) -> Codec {
        Codec::with_offset(self.id_secret, kind.spec().id_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn catalogue() -> Catalogue {
        Catalogue::new(Database::connect_in_memory().await.unwrap(), 72911)
    }

    #[tokio::test]
    async fn test_find_or_create_returns_same_row_second_time() {
        let catalogue = catalogue().await;
        let mut first = catalogue.author("Doe, John").await.unwrap();
        assert_eq!(first.id(), None, "miss produces a fresh entity");
        first.save().await.unwrap();
        let saved_id = first.id().unwrap();

        let second = catalogue.author("Doe, John").await.unwrap();
        assert_eq!(second.id(), Some(saved_id), "hit resolves to the saved row, not a second one");
        assert_eq!(first, second);
        let row: (i64,) =
            sqlx::query_as("SELECT count(*) FROM authors").fetch_one(catalogue.db.pool()).await.unwrap();
        assert_eq!(row.0, 1);
    }

    #[tokio::test]
    async fn test_find_or_create_hit_is_hydrated() {
        let catalogue = catalogue().await;
        let mut tag = catalogue.tag("hardback").await.unwrap();
        tag.save().await.unwrap();
        let mut found = catalogue.tag("hardback").await.unwrap();
        // No further query needed: the field map came with the lookup.
        assert_eq!(found.field("name").await.unwrap(), SqlValue::from("hardback"));
    }

    #[tokio::test]
    async fn test_find_or_create_duplicates_are_ambiguous() {
        let catalogue = catalogue().await;
        // Books have no uniqueness constraint on name; fabricate a
        // duplicate pair to exercise the defensive check.
        for _ in 0..2 {
            let mut book = catalogue.create(Kind::Book);
            book.set_field("name", SqlValue::from("Twin")).await.unwrap();
            book.save().await.unwrap();
        }
        let err = catalogue.find_or_create(Kind::Book, "name", SqlValue::from("Twin")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Ambiguous(_)));
    }

    #[tokio::test]
    async fn test_book_resolution_by_id_isbn_and_neither() {
        let catalogue = catalogue().await;
        let mut book = catalogue.create(Kind::Book);
        book.set_field("name", SqlValue::from("Dune")).await.unwrap();
        book.set_isbn("123-123-123-1").await.unwrap();
        book.save().await.unwrap();
        let id = book.id().unwrap();

        assert_eq!(catalogue.book(Some(id), None).await.unwrap().id(), Some(id));
        // ISBN formatting doesn't matter; it's matched on the clean column.
        assert_eq!(catalogue.book(None, Some("1 231 231 231")).await.unwrap().id(), Some(id));
        // Unknown id or ISBN, or neither: a fresh book.
        assert_eq!(catalogue.book(Some(999), None).await.unwrap().id(), None);
        assert_eq!(catalogue.book(None, Some("9999999999")).await.unwrap().id(), None);
        assert_eq!(catalogue.book(None, None).await.unwrap().id(), None);
    }

    #[tokio::test]
    async fn test_suggestions_normalize_prefix_and_cap_results() {
        let catalogue = catalogue().await;
        for name in ["L'Engle, Madeleine", "Le Guin, Ursula", "lem, stanisław", "Herbert, Frank"] {
            let mut author = catalogue.author(name).await.unwrap();
            author.save().await.unwrap();
        }

        let hits = catalogue.suggestions("le", "authors", "name", 10).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.contains(&"L'Engle, Madeleine".to_string()));
        assert!(!hits.contains(&"Herbert, Frank".to_string()));

        let capped = catalogue.suggestions("le", "authors", "name", 2).await.unwrap();
        assert_eq!(capped.len(), 2);
        assert!(catalogue.suggestions("   ", "authors", "name", 10).await.unwrap().is_empty());

        // Views are queryable like tables.
        let mut book = catalogue.create(Kind::Book);
        book.set_field("name", SqlValue::from("Dune")).await.unwrap();
        book.set_field("publisher", SqlValue::from("Chilton")).await.unwrap();
        book.save().await.unwrap();
        let hits = catalogue.suggestions("chi", "publishers", "name", 10).await.unwrap();
        assert_eq!(hits, vec!["Chilton".to_string()]);

        // Identifier escaping applies to the caller-supplied names.
        assert!(catalogue.suggestions("x", "authors\"; --", "name", 10).await.is_err());
    }

    #[tokio::test]
    async fn test_settings_and_sessions_round_trip() {
        let catalogue = catalogue().await;
        let settings = catalogue.settings();
        settings.set("library_name", "Home Library").await.unwrap();
        assert_eq!(settings.get("library_name").await.unwrap().as_deref(), Some("Home Library"));

        let sessions = catalogue.sessions();
        sessions.set("cookie-token", "{\"user\":1}").await.unwrap();
        assert_eq!(sessions.pop("cookie-token").await.unwrap().as_deref(), Some("{\"user\":1}"));
        assert_eq!(sessions.get("cookie-token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_opaque_codecs_differ_per_kind() {
        let catalogue = catalogue().await;
        let book_code = catalogue.opaque(Kind::Book).encode(7);
        let thumb_code = catalogue.opaque(Kind::Thumbnail).encode(7);
        assert_ne!(book_code, thumb_code);
        assert_eq!(catalogue.opaque(Kind::Book).decode(&book_code).unwrap(), 7);
        assert!(catalogue.opaque(Kind::Book).decode("not-an-id").is_err());
    }
}
