//! The generic entity: one typed handle per table row.
//!
//! An entity moves through explicit lifecycle states:
//!
//! - **Fresh** — no row id yet; every set field is held in the pending
//!   changes map and `save()` performs an INSERT.
//! - **Unhydrated** — the id is known but the field map has not been
//!   loaded; the first access to any declared field loads the row.
//! - **Hydrated** — id and field map both known.
//! - **Deleted** — terminal; the backing row is gone and any further use
//!   fails with `InvalidState`.
//!
//! Once an id is assigned it never changes for that handle. Setters
//! record a change only when the new value differs from the known stored
//! value, so saving a clean entity performs no write at all.

use crate::db::Database;
use crate::error::{ErrorKind, Result, lift_sql};
use crate::isbn::Isbn;
use crate::kind::Kind;
use crate::text;
use exn::OptionExt;
use octavo_sql::{SqlBuilder, SqlValue, exec, row_pairs};
use std::collections::BTreeMap;
use time::UtcDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Unhydrated(i64),
    Hydrated(i64),
    Deleted,
}

/// A lazily hydrated, change-tracked handle over one row of one table.
#[derive(Debug, Clone)]
pub struct Entity {
    db: Database,
    kind: Kind,
    state: State,
    data: BTreeMap<String, SqlValue>,
    changes: BTreeMap<String, SqlValue>,
    builder: SqlBuilder,
}

impl Entity {
    /// A fresh entity with no backing row. `save()` will INSERT it.
    pub fn create(db: Database, kind: Kind) -> Self {
        Self {
            db,
            kind,
            state: State::Fresh,
            data: BTreeMap::new(),
            changes: BTreeMap::new(),
            builder: SqlBuilder::new(),
        }
    }

    /// A handle for an existing row id, without querying for it yet. The
    /// row's existence is checked on first field access, which fails with
    /// [`NotFound`](ErrorKind::NotFound) if it has meanwhile disappeared.
    pub fn load(db: Database, kind: Kind, id: i64) -> Self {
        Self {
            db,
            kind,
            state: State::Unhydrated(id),
            data: BTreeMap::new(),
            changes: BTreeMap::new(),
            builder: SqlBuilder::new(),
        }
    }

    /// A hydrated handle built directly from an already-fetched row.
    pub(crate) fn from_row(db: Database, kind: Kind, id: i64, data: BTreeMap<String, SqlValue>) -> Self {
        Self { db, kind, state: State::Hydrated(id), data, changes: BTreeMap::new(), builder: SqlBuilder::new() }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The backing row id, if one has been assigned.
    pub fn id(&self) -> Option<i64> {
        match self.state {
            State::Unhydrated(id) | State::Hydrated(id) => Some(id),
            State::Fresh | State::Deleted => None,
        }
    }

    /// Whether there are field changes not yet flushed to storage.
    pub fn dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn is_deleted(&self) -> bool {
        self.state == State::Deleted
    }

    /// Persisted and clean: the precondition for participating in
    /// relationship operations.
    pub(crate) fn saved(&self) -> bool {
        self.id().is_some() && !self.dirty()
    }

    fn ensure_usable(&self, operation: &'static str) -> Result<()> {
        if self.state == State::Deleted {
            exn::bail!(ErrorKind::InvalidState(operation));
        }
        Ok(())
    }

    fn ensure_declared(&self, field: &str) -> Result<()> {
        if !self.kind.declares(field) {
            exn::bail!(ErrorKind::UnknownField(field.to_string()));
        }
        Ok(())
    }

    /// Load the field map if this handle is Unhydrated.
    async fn hydrate(&mut self) -> Result<()> {
        let State::Unhydrated(id) = self.state else {
            return Ok(());
        };
        let spec = self.kind.spec();
        let statement = self
            .builder
            .select(spec.table, &["*"], &[(spec.id_column, SqlValue::from(id))], &[])
            .map_err(lift_sql)?;
        let row = exec::fetch_optional(self.db.pool(), &statement)
            .await
            .map_err(lift_sql)?
            .ok_or_raise(|| ErrorKind::NotFound { kind: self.kind.name(), id })?;
        self.data = row_pairs(&row).map_err(lift_sql)?.into_iter().collect();
        self.state = State::Hydrated(id);
        Ok(())
    }

    /// The stored value of a declared field.
    ///
    /// Reflects the row as loaded; pending changes are not visible until
    /// the entity is saved. A fresh entity reads every field as Null.
    pub async fn field(&mut self, field: &str) -> Result<SqlValue> {
        self.ensure_usable("field access")?;
        self.ensure_declared(field)?;
        self.hydrate().await?;
        Ok(self.data.get(field).cloned().unwrap_or(SqlValue::Null))
    }

    /// The whole stored field map, hydrating if necessary.
    pub async fn field_map(&mut self) -> Result<&BTreeMap<String, SqlValue>> {
        self.ensure_usable("field access")?;
        self.hydrate().await?;
        Ok(&self.data)
    }

    /// Record a change only when the value differs from what storage
    /// already holds (fresh entities record everything).
    fn record_change(&mut self, field: &str, value: SqlValue) {
        let differs = match self.state {
            State::Fresh => true,
            _ => self.data.get(field) != Some(&value),
        };
        if differs {
            self.changes.insert(field.to_string(), value);
        }
    }

    /// Set a declared scalar field.
    ///
    /// Strings are trimmed and internal whitespace-runs collapsed; an
    /// empty string becomes Null. Managed fields (derived columns, ISBN)
    /// reject the generic setter.
    pub async fn set_field(&mut self, field: &str, value: SqlValue) -> Result<()> {
        self.ensure_usable("field update")?;
        self.ensure_declared(field)?;
        if !self.kind.settable(field) {
            exn::bail!(ErrorKind::UnknownField(field.to_string()));
        }
        let value = match value {
            SqlValue::Text(s) => {
                let normalized = text::normalize(&s);
                match normalized.is_empty() {
                    true => SqlValue::Null,
                    false => SqlValue::Text(normalized),
                }
            },
            other => other,
        };
        // Diffing needs the stored value, so setting on an unhydrated
        // handle loads the row first (and notices a vanished row now
        // rather than at save time).
        self.hydrate().await?;
        self.record_change(field, value);
        Ok(())
    }

    /// A declared date field as a timestamp.
    pub async fn date(&mut self, field: &str) -> Result<Option<UtcDateTime>> {
        if !self.kind.spec().date_fields.contains(&field) {
            exn::bail!(ErrorKind::UnknownField(field.to_string()));
        }
        match self.field(field).await? {
            SqlValue::Null => Ok(None),
            SqlValue::Integer(epoch) => Ok(Some(
                UtcDateTime::from_unix_timestamp(epoch).map_err(|_| exn::Exn::from(ErrorKind::InvalidData("epoch seconds")))?,
            )),
            _ => exn::bail!(ErrorKind::InvalidData("date fields store epoch seconds")),
        }
    }

    /// Set a declared date field. Sub-second precision is dropped: dates
    /// are stored as whole epoch seconds.
    pub async fn set_date(&mut self, field: &str, value: Option<UtcDateTime>) -> Result<()> {
        if !self.kind.spec().date_fields.contains(&field) {
            exn::bail!(ErrorKind::UnknownField(field.to_string()));
        }
        self.ensure_usable("field update")?;
        self.hydrate().await?;
        self.record_change(field, SqlValue::from(value.map(|t| t.unix_timestamp())));
        Ok(())
    }

    /// Record a new ISBN, validating it first.
    ///
    /// Books keep the user's exact entry in `isbn_user`; a trigger derives
    /// the clean `isbn` column from it on save. Barcode-queue entries
    /// store the normalized number directly. Other kinds have no ISBN.
    pub async fn set_isbn(&mut self, raw: &str) -> Result<()> {
        self.ensure_usable("field update")?;
        let input = Isbn::new(raw);
        match self.kind {
            Kind::Book => {
                self.hydrate().await?;
                let current = Isbn::new(self.data.get("isbn").and_then(|v| v.as_text()).unwrap_or(""));
                if self.state == State::Fresh || current != input {
                    if !input.is_valid() {
                        exn::bail!(ErrorKind::InvalidIsbn(raw.to_string()));
                    }
                    // An empty entry is valid ("no ISBN") but clears nothing.
                    if input.number().is_some() {
                        self.changes.insert("isbn_user".to_string(), SqlValue::from(raw));
                    }
                }
                Ok(())
            },
            Kind::Barcode => {
                self.hydrate().await?;
                let number = input.number();
                if self.state == State::Fresh
                    || self.data.get("isbn").and_then(|v| v.as_text()) != number.as_deref()
                {
                    if !input.is_valid() {
                        exn::bail!(ErrorKind::InvalidIsbn(raw.to_string()));
                    }
                    if let Some(number) = number {
                        self.changes.insert("isbn".to_string(), SqlValue::from(number));
                    }
                }
                Ok(())
            },
            _ => exn::bail!(ErrorKind::UnknownField("isbn".to_string())),
        }
    }

    /// The clean stored ISBN: pretty-printed for books, the normalized
    /// number for barcode-queue entries.
    pub async fn isbn(&mut self) -> Result<Option<String>> {
        match self.kind {
            Kind::Book => Ok(self.field("isbn").await?.as_text().map(|s| Isbn::new(s).pretty())),
            Kind::Barcode => Ok(self.field("isbn").await?.as_text().map(str::to_string)),
            _ => exn::bail!(ErrorKind::UnknownField("isbn".to_string())),
        }
    }

    /// Flush pending changes.
    ///
    /// Null-valued pending changes are dropped first (clearing a field
    /// that was never written is not a write). A fresh entity with
    /// changes is INSERTed and its declared id column read back via the
    /// engine rowid — the two can differ. A persisted entity with changes
    /// is UPDATEd by id. Either way the handle becomes Unhydrated so the
    /// next read observes trigger-maintained columns; with no changes at
    /// all this is a no-op success without I/O.
    pub async fn save(&mut self) -> Result<()> {
        self.ensure_usable("save")?;
        self.changes.retain(|_, value| !value.is_null());
        if self.changes.is_empty() {
            return Ok(());
        }
        let spec = self.kind.spec();
        let pairs: Vec<(&str, SqlValue)> =
            self.changes.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        match self.state {
            State::Fresh => {
                let statement = self.builder.insert(spec.table, &pairs).map_err(lift_sql)?;
                let rowid = exec::insert(self.db.pool(), &statement).await.map_err(lift_sql)?;
                let id_query = self
                    .builder
                    .select(spec.table, &[spec.id_column], &[("_rowid_", SqlValue::from(rowid))], &[])
                    .map_err(lift_sql)?;
                let row = exec::fetch_optional(self.db.pool(), &id_query)
                    .await
                    .map_err(lift_sql)?
                    .ok_or_raise(|| ErrorKind::NotFound { kind: self.kind.name(), id: rowid })?;
                let id = row_pairs(&row)
                    .map_err(lift_sql)?
                    .into_iter()
                    .next()
                    .and_then(|(_, value)| value.as_integer())
                    .ok_or_raise(|| ErrorKind::InvalidData("id column"))?;
                self.state = State::Unhydrated(id);
            },
            State::Unhydrated(id) | State::Hydrated(id) => {
                let statement = self
                    .builder
                    .update(spec.table, &pairs, &[(spec.id_column, SqlValue::from(id))])
                    .map_err(lift_sql)?;
                exec::execute(self.db.pool(), &statement).await.map_err(lift_sql)?;
                self.state = State::Unhydrated(id);
            },
            State::Deleted => unreachable!("checked by ensure_usable"),
        }
        self.data.clear();
        self.changes.clear();
        Ok(())
    }

    /// Delete the backing row and make this handle permanently unusable.
    ///
    /// Junction rows referencing the entity are removed by the schema's
    /// foreign-key cascades. Deleting a fresh entity just invalidates the
    /// handle.
    pub async fn delete(&mut self) -> Result<()> {
        self.ensure_usable("delete")?;
        if let Some(id) = self.id() {
            let spec = self.kind.spec();
            let statement = self
                .builder
                .delete(spec.table, &[(spec.id_column, SqlValue::from(id))])
                .map_err(lift_sql)?;
            exec::execute(self.db.pool(), &statement).await.map_err(lift_sql)?;
        }
        self.state = State::Deleted;
        self.data.clear();
        self.changes.clear();
        Ok(())
    }
}

impl PartialEq for Entity {
    /// Two handles are equal when they are the same kind of entity, have
    /// both been assigned the same row id, and share a backing database.
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.id().is_some()
            && self.id() == other.id()
            && self.db == other.db
    }
}
