//! Statement execution against a SQLite pool.
//!
//! Every call here executes exactly one statement. SQLite wraps each
//! statement in an implicit transaction, so a failed mutation has no
//! effect and the error is re-raised; cross-statement atomicity is the
//! caller's concern (see the catalogue facade for the one place that
//! opens an explicit transaction).

use crate::builder::Statement;
use crate::error::{ErrorKind, Result};
use crate::value::SqlValue;
use async_stream::stream;
use futures::Stream;
use sqlx::SqliteExecutor;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool, SqliteRow};
use std::pin::Pin;
use tracing::debug;

/// A lazy, finite, non-restartable stream of rows.
pub type RowStream<'a> = Pin<Box<dyn Stream<Item = Result<SqliteRow>> + Send + 'a>>;

/// Classify a sqlx failure: constraint violations are a distinct category
/// the caller may treat as "already exists"; everything else is opaque.
pub(crate) fn classify(error: sqlx::Error) -> ErrorKind {
    match error.as_database_error() {
        Some(db)
            if matches!(
                db.kind(),
                sqlx::error::ErrorKind::UniqueViolation
                    | sqlx::error::ErrorKind::ForeignKeyViolation
                    | sqlx::error::ErrorKind::NotNullViolation
                    | sqlx::error::ErrorKind::CheckViolation
            ) =>
        {
            ErrorKind::Constraint
        },
        _ => ErrorKind::Database,
    }
}

/// Bind a statement's parameters, in order, onto a sqlx query.
fn bind<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in params {
        query = match value {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Integer(n) => query.bind(*n),
            SqlValue::Real(x) => query.bind(*x),
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Blob(b) => query.bind(b.as_slice()),
        };
    }
    query
}

/// Fetch every row of a SELECT.
pub async fn fetch_all<'e, E>(executor: E, statement: &Statement) -> Result<Vec<SqliteRow>>
where
    E: SqliteExecutor<'e>,
{
    debug!(sql = %statement.sql, "fetch");
    bind(sqlx::query(&statement.sql), &statement.params)
        .fetch_all(executor)
        .await
        .map_err(|e| exn::Exn::from(classify(e)))
}

/// Fetch at most one row of a SELECT.
pub async fn fetch_optional<'e, E>(executor: E, statement: &Statement) -> Result<Option<SqliteRow>>
where
    E: SqliteExecutor<'e>,
{
    debug!(sql = %statement.sql, "fetch");
    bind(sqlx::query(&statement.sql), &statement.params)
        .fetch_optional(executor)
        .await
        .map_err(|e| exn::Exn::from(classify(e)))
}

/// Execute an INSERT, returning the engine's last-inserted row identifier.
pub async fn insert<'e, E>(executor: E, statement: &Statement) -> Result<i64>
where
    E: SqliteExecutor<'e>,
{
    debug!(sql = %statement.sql, "insert");
    let result = bind(sqlx::query(&statement.sql), &statement.params)
        .execute(executor)
        .await
        .map_err(|e| exn::Exn::from(classify(e)))?;
    Ok(result.last_insert_rowid())
}

/// Execute an UPDATE or DELETE, returning the affected-row count.
pub async fn execute<'e, E>(executor: E, statement: &Statement) -> Result<u64>
where
    E: SqliteExecutor<'e>,
{
    debug!(sql = %statement.sql, "execute");
    let result = bind(sqlx::query(&statement.sql), &statement.params)
        .execute(executor)
        .await
        .map_err(|e| exn::Exn::from(classify(e)))?;
    Ok(result.rows_affected())
}

/// Lazily iterate a SELECT in chunks.
///
/// Rows are fetched `chunk_size` at a time and yielded one by one,
/// stopping early once `limit` rows have been produced (`limit < 0`
/// yields everything). The stream is finite and cannot be restarted;
/// rows inserted behind the cursor position may or may not be observed.
pub fn iterate(pool: &SqlitePool, statement: Statement, limit: i64, chunk_size: usize) -> RowStream<'_> {
    let chunk_size = chunk_size.max(1);
    Box::pin(stream! {
        let sql = format!("{} LIMIT ? OFFSET ?", statement.sql);
        let mut offset: i64 = 0;
        let mut yielded: i64 = 0;
        'chunks: loop {
            if limit >= 0 && yielded >= limit {
                break;
            }
            debug!(sql = %sql, offset, "fetch chunk");
            let query = bind(sqlx::query(&sql), &statement.params)
                .bind(chunk_size as i64)
                .bind(offset);
            let rows = match query.fetch_all(pool).await {
                Ok(rows) => rows,
                Err(e) => {
                    yield Err(exn::Exn::from(classify(e)));
                    break 'chunks;
                },
            };
            let fetched = rows.len();
            for row in rows {
                if limit >= 0 && yielded >= limit {
                    break 'chunks;
                }
                yielded += 1;
                yield Ok(row);
            }
            if fetched < chunk_size {
                break;
            }
            offset += fetched as i64;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{OrderBy, SqlBuilder};
    use crate::value::row_pairs;
    use futures::TryStreamExt;

    async fn pool_with_table() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query("CREATE TABLE samples (id integer primary key, name text, rank integer)")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_insert_fetch_update_delete_round() {
        let pool = pool_with_table().await;
        let builder = SqlBuilder::new();

        let rowid = insert(
            &pool,
            &builder
                .insert("samples", &[("name", SqlValue::from("alpha")), ("rank", SqlValue::from(1i64))])
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(rowid, 1);

        let affected = execute(
            &pool,
            &builder
                .update("samples", &[("rank", SqlValue::from(2i64))], &[("id", SqlValue::from(rowid))])
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(affected, 1);

        let row = fetch_optional(
            &pool,
            &builder.select("samples", &["*"], &[("id", SqlValue::from(rowid))], &[]).unwrap(),
        )
        .await
        .unwrap()
        .unwrap();
        let pairs = row_pairs(&row).unwrap();
        assert!(pairs.contains(&("rank".to_string(), SqlValue::Integer(2))));

        let deleted = execute(
            &pool,
            &builder.delete("samples", &[("id", SqlValue::from(rowid))]).unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(deleted, 1);
    }

    #[tokio::test]
    async fn test_failed_statement_has_no_effect() {
        let pool = pool_with_table().await;
        let builder = SqlBuilder::new();
        let result = insert(
            &pool,
            &builder
                .insert("nonexistent", &[("name", SqlValue::from("x"))])
                .unwrap(),
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Database));
    }

    #[tokio::test]
    async fn test_constraint_violation_is_classified() {
        let pool = pool_with_table().await;
        sqlx::query("CREATE UNIQUE INDEX samples_name ON samples (name)").execute(&pool).await.unwrap();
        let builder = SqlBuilder::new();
        let stmt = builder.insert("samples", &[("name", SqlValue::from("dup"))]).unwrap();
        insert(&pool, &stmt).await.unwrap();
        let err = insert(&pool, &stmt).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Constraint));
    }

    #[tokio::test]
    async fn test_iterate_chunked_with_limit() {
        let pool = pool_with_table().await;
        let builder = SqlBuilder::new();
        for i in 0..25i64 {
            insert(
                &pool,
                &builder
                    .insert("samples", &[("name", SqlValue::from(format!("row{i:02}"))), ("rank", SqlValue::from(i))])
                    .unwrap(),
            )
            .await
            .unwrap();
        }

        let select = builder.select("samples", &["name"], &[], &[OrderBy::asc("rank")]).unwrap();
        let rows: Vec<_> = iterate(&pool, select.clone(), 7, 3).try_collect().await.unwrap();
        assert_eq!(rows.len(), 7);
        let first = row_pairs(&rows[0]).unwrap();
        assert_eq!(first[0].1, SqlValue::Text("row00".to_string()));

        // Unbounded iteration drains the table.
        let rows: Vec<_> = iterate(&pool, select, -1, 10).try_collect().await.unwrap();
        assert_eq!(rows.len(), 25);
    }
}
