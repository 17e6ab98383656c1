//! Parameterized statement construction.

use crate::Pairs;
use crate::error::{ErrorKind, Result};
use crate::escape::{Delimiters, escape};
use crate::value::SqlValue;

/// A built statement: SQL text with escaped, interpolated identifiers and
/// the values to bind, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// One ORDER BY term. The column is escaped like any other identifier;
/// raw SQL fragments are never interpolated.
#[derive(Debug, Clone, Copy)]
pub struct OrderBy<'a> {
    pub column: &'a str,
    pub descending: bool,
}

impl<'a> OrderBy<'a> {
    pub fn asc(column: &'a str) -> Self {
        Self { column, descending: false }
    }

    pub fn desc(column: &'a str) -> Self {
        Self { column, descending: true }
    }
}

/// Builds SELECT/INSERT/UPDATE/DELETE statements from caller-supplied
/// table and column names.
///
/// Identifiers are validated and interpolated (SQL cannot parameter-bind
/// them); values always become `?` placeholders. Where-map iteration
/// order determines parameter order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlBuilder {
    delimiters: Delimiters,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder using a custom identifier delimiter pair instead of the
    /// standard double quotes.
    pub fn with_delimiters(open: char, close: char) -> Self {
        Self { delimiters: Delimiters { open, close } }
    }

    /// Escape a single identifier (table or column name).
    pub fn escape_identifier(&self, name: &str) -> Result<String> {
        escape(name, self.delimiters)
    }

    /// `SELECT <columns> FROM <table> [WHERE ...] [ORDER BY ...]`.
    ///
    /// Pass `&["*"]` for a wildcard select. An empty predicate map selects
    /// every row.
    pub fn select(&self, table: &str, columns: &[&str], predicate: Pairs, order: &[OrderBy]) -> Result<Statement> {
        self.select_inner(false, table, columns, predicate, order)
    }

    /// [`select`](Self::select) with a `DISTINCT` result set.
    pub fn select_distinct(
        &self,
        table: &str,
        columns: &[&str],
        predicate: Pairs,
        order: &[OrderBy],
    ) -> Result<Statement> {
        self.select_inner(true, table, columns, predicate, order)
    }

    fn select_inner(
        &self,
        distinct: bool,
        table: &str,
        columns: &[&str],
        predicate: Pairs,
        order: &[OrderBy],
    ) -> Result<Statement> {
        if columns.is_empty() {
            exn::bail!(ErrorKind::InvalidData("select requires at least one column"));
        }
        let columns =
            columns.iter().map(|c| self.escape_identifier(c)).collect::<Result<Vec<_>>>()?.join(", ");
        let mut sql = format!(
            "SELECT {}{} FROM {}",
            if distinct { "DISTINCT " } else { "" },
            columns,
            self.escape_identifier(table)?
        );
        let params = self.push_predicate(&mut sql, predicate)?;
        if !order.is_empty() {
            let terms = order
                .iter()
                .map(|o| {
                    let column = self.escape_identifier(o.column)?;
                    Ok(match o.descending {
                        true => format!("{column} DESC"),
                        false => column,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        Ok(Statement { sql, params })
    }

    /// Fixed-arity `INSERT INTO <table> (a, b) VALUES (?, ?)`.
    pub fn insert(&self, table: &str, data: Pairs) -> Result<Statement> {
        if data.is_empty() {
            exn::bail!(ErrorKind::InvalidData("insert requires at least one value"));
        }
        let columns =
            data.iter().map(|(c, _)| self.escape_identifier(c)).collect::<Result<Vec<_>>>()?.join(",");
        let placeholders = vec!["?"; data.len()].join(",");
        Ok(Statement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.escape_identifier(table)?,
                columns,
                placeholders
            ),
            params: data.iter().map(|(_, v)| v.clone()).collect(),
        })
    }

    /// `UPDATE <table> SET a=?, b=? [WHERE ...]`.
    pub fn update(&self, table: &str, data: Pairs, predicate: Pairs) -> Result<Statement> {
        if data.is_empty() {
            exn::bail!(ErrorKind::InvalidData("update requires at least one value"));
        }
        let assignments = data
            .iter()
            .map(|(c, _)| Ok(format!("{}=?", self.escape_identifier(c)?)))
            .collect::<Result<Vec<_>>>()?
            .join(",");
        let mut sql = format!("UPDATE {} SET {}", self.escape_identifier(table)?, assignments);
        let mut params: Vec<SqlValue> = data.iter().map(|(_, v)| v.clone()).collect();
        params.extend(self.push_predicate(&mut sql, predicate)?);
        Ok(Statement { sql, params })
    }

    /// `DELETE FROM <table> [WHERE ...]`. An empty predicate deletes
    /// every row.
    pub fn delete(&self, table: &str, predicate: Pairs) -> Result<Statement> {
        let mut sql = format!("DELETE FROM {}", self.escape_identifier(table)?);
        let params = self.push_predicate(&mut sql, predicate)?;
        Ok(Statement { sql, params })
    }

    /// Append ` WHERE a=? AND b=?` and return the predicate values in
    /// placeholder order.
    fn push_predicate(&self, sql: &mut String, predicate: Pairs) -> Result<Vec<SqlValue>> {
        if predicate.is_empty() {
            return Ok(Vec::new());
        }
        let clause = predicate
            .iter()
            .map(|(c, _)| Ok(format!("{}=?", self.escape_identifier(c)?)))
            .collect::<Result<Vec<_>>>()?
            .join(" AND ");
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
        Ok(predicate.iter().map(|(_, v)| v.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_select_wildcard() {
        let stmt = SqlBuilder::new().select("books", &["*"], &[], &[]).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM \"books\"");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_select_distinct() {
        let stmt = SqlBuilder::new()
            .select_distinct("books", &["publisher"], &[], &[OrderBy::asc("publisher")])
            .unwrap();
        assert_eq!(stmt.sql, "SELECT DISTINCT \"publisher\" FROM \"books\" ORDER BY \"publisher\"");
    }

    #[test]
    fn test_select_with_predicate_and_order() {
        let stmt = SqlBuilder::new()
            .select(
                "books",
                &["id", "name"],
                &[("publisher", SqlValue::from("Ace")), ("year", SqlValue::from(1965i64))],
                &[OrderBy::asc("name"), OrderBy::desc("year")],
            )
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"id\", \"name\" FROM \"books\" WHERE \"publisher\"=? AND \"year\"=? \
             ORDER BY \"name\", \"year\" DESC"
        );
        // Placeholder order matches map iteration order.
        assert_eq!(stmt.params, vec![SqlValue::from("Ace"), SqlValue::from(1965i64)]);
    }

    #[test]
    fn test_insert_is_fixed_arity() {
        let stmt = SqlBuilder::new()
            .insert("authors", &[("name", SqlValue::from("Doe, John"))])
            .unwrap();
        assert_eq!(stmt.sql, "INSERT INTO \"authors\" (\"name\") VALUES (?)");
        assert_eq!(stmt.params.len(), 1);
    }

    #[test]
    fn test_update_places_data_params_before_predicate_params() {
        let stmt = SqlBuilder::new()
            .update(
                "books",
                &[("name", SqlValue::from("Dune")), ("year", SqlValue::from(1965i64))],
                &[("id", SqlValue::from(3i64))],
            )
            .unwrap();
        assert_eq!(stmt.sql, "UPDATE \"books\" SET \"name\"=?,\"year\"=? WHERE \"id\"=?");
        assert_eq!(
            stmt.params,
            vec![SqlValue::from("Dune"), SqlValue::from(1965i64), SqlValue::from(3i64)]
        );
    }

    #[test]
    fn test_delete() {
        let stmt = SqlBuilder::new().delete("book_tags", &[("book_id", SqlValue::from(9i64))]).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM \"book_tags\" WHERE \"book_id\"=?");
    }

    #[test]
    fn test_identifiers_are_validated_everywhere() {
        let builder = SqlBuilder::new();
        assert!(builder.select("bo\"oks", &["*"], &[], &[]).is_err());
        assert!(builder.select("books", &["na\"me"], &[], &[]).is_err());
        assert!(builder.select("books", &["*"], &[("i\"d", SqlValue::Null)], &[]).is_err());
        let err = builder
            .select("books", &["*"], &[], &[OrderBy::asc("name\"; DROP TABLE books; --")])
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::InjectionRisk(_)));
    }

    #[test]
    fn test_empty_data_is_rejected() {
        let builder = SqlBuilder::new();
        assert!(builder.insert("books", &[]).is_err());
        assert!(builder.update("books", &[], &[("id", SqlValue::from(1i64))]).is_err());
    }
}
