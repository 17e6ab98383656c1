//! Map-like storage over a two-column (key, value) table.

use crate::builder::SqlBuilder;
use crate::error::{ErrorKind, Result};
use crate::exec;
use crate::value::{SqlValue, row_pairs};
use exn::OptionExt;
use sqlx::sqlite::SqlitePool;

/// Dictionary-style access to one table with a key column and a value
/// column, used for application settings (`app_config`) and session
/// records (`sessions`).
///
/// The key column is expected to carry a uniqueness constraint; if two
/// rows ever share a key anyway, reads fail with
/// [`Ambiguous`](ErrorKind::Ambiguous) instead of picking one.
#[derive(Debug, Clone)]
pub struct KvStore {
    pool: SqlitePool,
    builder: SqlBuilder,
    table: String,
    key_column: String,
    value_column: String,
}

impl KvStore {
    pub fn new(
        pool: SqlitePool,
        table: impl Into<String>,
        key_column: impl Into<String>,
        value_column: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            builder: SqlBuilder::new(),
            table: table.into(),
            key_column: key_column.into(),
            value_column: value_column.into(),
        }
    }

    /// The stored value for `key`, or `None`.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let statement = self.builder.select(
            &self.table,
            &[&self.value_column],
            &[(&self.key_column, SqlValue::from(key))],
            &[],
        )?;
        let rows = exec::fetch_all(&self.pool, &statement).await?;
        if rows.len() > 1 {
            exn::bail!(ErrorKind::Ambiguous(key.to_string()));
        }
        match rows.first() {
            None => Ok(None),
            Some(row) => {
                let (_, value) = row_pairs(row)?.into_iter().next().ok_or_raise(|| ErrorKind::Database)?;
                Ok(match value {
                    SqlValue::Null => None,
                    SqlValue::Text(s) => Some(s),
                    SqlValue::Integer(n) => Some(n.to_string()),
                    SqlValue::Real(x) => Some(x.to_string()),
                    SqlValue::Blob(_) => exn::bail!(ErrorKind::InvalidData("key-value tables store text values")),
                })
            },
        }
    }

    /// The stored value for `key`, or a caller-supplied default.
    pub async fn get_or(&self, key: &str, default: impl Into<String>) -> Result<String> {
        Ok(self.get(key).await?.unwrap_or_else(|| default.into()))
    }

    /// Whether `key` has a stored value.
    pub async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Store `value` under `key`: UPDATE if the key exists, INSERT
    /// otherwise.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let statement = match self.contains(key).await? {
            true => self.builder.update(
                &self.table,
                &[(&self.value_column, SqlValue::from(value))],
                &[(&self.key_column, SqlValue::from(key))],
            )?,
            false => self.builder.insert(
                &self.table,
                &[(&self.key_column, SqlValue::from(key)), (&self.value_column, SqlValue::from(value))],
            )?,
        };
        exec::execute(&self.pool, &statement).await?;
        Ok(())
    }

    /// Remove `key`, failing with [`NotFound`](ErrorKind::NotFound) if it
    /// has no stored value.
    pub async fn delete(&self, key: &str) -> Result<()> {
        if !self.contains(key).await? {
            exn::bail!(ErrorKind::NotFound(key.to_string()));
        }
        let statement =
            self.builder.delete(&self.table, &[(&self.key_column, SqlValue::from(key))])?;
        exec::execute(&self.pool, &statement).await?;
        Ok(())
    }

    /// Remove `key` and return its value, or `None` if it was absent.
    pub async fn pop(&self, key: &str) -> Result<Option<String>> {
        let value = self.get(key).await?;
        if value.is_some() {
            self.delete(key).await?;
        }
        Ok(value)
    }
}
