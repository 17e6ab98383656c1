//! Dynamic SQL values.
//!
//! The entity layer works with field maps whose value types are only known
//! at runtime, so rows are decoded into [`SqlValue`] by SQLite storage
//! class rather than into static structs.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::cmp::Ordering;

/// A single dynamically typed SQLite value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns `true` for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// The value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// The value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Total ordering for in-memory sorts of mixed columns, mirroring
    /// SQLite's storage-class ordering: NULL, then numeric, then text,
    /// then blob.
    pub fn sort_cmp(&self, other: &SqlValue) -> Ordering {
        fn class(v: &SqlValue) -> u8 {
            match v {
                SqlValue::Null => 0,
                SqlValue::Integer(_) | SqlValue::Real(_) => 1,
                SqlValue::Text(_) => 2,
                SqlValue::Blob(_) => 3,
            }
        }
        fn numeric(v: &SqlValue) -> f64 {
            match v {
                SqlValue::Integer(n) => *n as f64,
                SqlValue::Real(x) => *x,
                _ => 0.0,
            }
        }
        match (self, other) {
            (a, b) if class(a) != class(b) => class(a).cmp(&class(b)),
            (SqlValue::Text(a), SqlValue::Text(b)) => a.cmp(b),
            (SqlValue::Blob(a), SqlValue::Blob(b)) => a.cmp(b),
            (a, b) if class(a) == 1 => numeric(a).partial_cmp(&numeric(b)).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(n: i64) -> Self {
        SqlValue::Integer(n)
    }
}
impl From<f64> for SqlValue {
    fn from(x: f64) -> Self {
        SqlValue::Real(x)
    }
}
impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}
impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}
impl From<Vec<u8>> for SqlValue {
    fn from(b: Vec<u8>) -> Self {
        SqlValue::Blob(b)
    }
}
impl<T> From<Option<T>> for SqlValue
where
    SqlValue: From<T>,
{
    fn from(opt: Option<T>) -> Self {
        opt.map_or(SqlValue::Null, SqlValue::from)
    }
}

/// Decode every column of a row into `(column name, value)` pairs,
/// preserving the statement's column order.
pub fn row_pairs(row: &SqliteRow) -> Result<Vec<(String, SqlValue)>> {
    let mut pairs = Vec::with_capacity(row.columns().len());
    for column in row.columns() {
        let ordinal = column.ordinal();
        let raw = row.try_get_raw(ordinal).or_raise(|| ErrorKind::Database)?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            // SQLite value type info reports the actual storage class of
            // the value, not the declared column affinity.
            match raw.type_info().name() {
                "INTEGER" => SqlValue::Integer(row.try_get(ordinal).or_raise(|| ErrorKind::Database)?),
                "REAL" => SqlValue::Real(row.try_get(ordinal).or_raise(|| ErrorKind::Database)?),
                "TEXT" => SqlValue::Text(row.try_get(ordinal).or_raise(|| ErrorKind::Database)?),
                _ => SqlValue::Blob(row.try_get(ordinal).or_raise(|| ErrorKind::Database)?),
            }
        };
        pairs.push((column.name().to_string(), value));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_option() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(7i64)), SqlValue::Integer(7));
    }

    #[test]
    fn test_sort_cmp_orders_by_storage_class() {
        let mut values = vec![
            SqlValue::Text("b".to_string()),
            SqlValue::Integer(3),
            SqlValue::Null,
            SqlValue::Real(1.5),
            SqlValue::Text("a".to_string()),
        ];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            values,
            vec![
                SqlValue::Null,
                SqlValue::Real(1.5),
                SqlValue::Integer(3),
                SqlValue::Text("a".to_string()),
                SqlValue::Text("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_integer_and_real_compare_numerically() {
        assert_eq!(SqlValue::Integer(2).sort_cmp(&SqlValue::Real(1.5)), Ordering::Greater);
        assert_eq!(SqlValue::Real(2.0).sort_cmp(&SqlValue::Integer(4)), Ordering::Less);
    }
}
