//! SQLite implementation of the QueryExecutor port.

use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::query::Query;
use sqlx::{Column, Row as _, SqlitePool, TypeInfo, ValueRef};
use tracing::trace;

use crate::domain::errors::QueryError;
use crate::domain::models::{Row, Value};
use crate::domain::ports::QueryExecutor;

#[derive(Clone)]
pub struct SqliteQueryExecutor {
    pool: SqlitePool,
}

impl SqliteQueryExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl QueryExecutor for SqliteQueryExecutor {
    async fn execute(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, QueryError> {
        trace!(query, ?params, "executing query");

        let rows = bind_all(sqlx::query(query), params)
            .fetch_all(&self.pool)
            .await?;

        trace!(rows = rows.len(), "query returned");
        rows.iter().map(decode_row).collect()
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Integer(i) => query.bind(*i),
            Value::Real(r) => query.bind(*r),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Blob(bytes) => query.bind(bytes.as_slice()),
        };
    }
    query
}

/// Decode a row by the storage class of each value.
fn decode_row(row: &SqliteRow) -> Result<Row, QueryError> {
    let mut out = Row::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let storage = {
            let raw = row.try_get_raw(index)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_ascii_uppercase())
            }
        };

        let value = match storage.as_deref() {
            None => Value::Null,
            Some("INTEGER" | "INT" | "INT8" | "BIGINT") => {
                Value::Integer(row.try_get_unchecked::<i64, _>(index)?)
            }
            Some("BOOLEAN") => Value::Bool(row.try_get_unchecked::<bool, _>(index)?),
            Some("REAL" | "FLOAT" | "DOUBLE" | "NUMERIC") => {
                Value::Real(row.try_get_unchecked::<f64, _>(index)?)
            }
            Some("BLOB") => Value::Blob(row.try_get_unchecked::<Vec<u8>, _>(index)?),
            Some(_) => Value::Text(row.try_get_unchecked::<String, _>(index)?),
        };

        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_test_pool;

    async fn setup() -> SqliteQueryExecutor {
        let pool = create_test_pool().await.expect("failed to create pool");
        sqlx::query(
            "CREATE TABLE sample (id INTEGER PRIMARY KEY, name TEXT, ratio REAL, payload BLOB, note TEXT)",
        )
        .execute(&pool)
        .await
        .expect("failed to create table");
        sqlx::query("INSERT INTO sample (id, name, ratio, payload, note) VALUES (1, 'one', 0.5, x'6869', NULL)")
            .execute(&pool)
            .await
            .expect("failed to insert row");
        SqliteQueryExecutor::new(pool)
    }

    #[tokio::test]
    async fn test_decodes_storage_classes() {
        let executor = setup().await;
        let rows = executor
            .execute("SELECT id, name, ratio, payload, note FROM sample", &[])
            .await
            .expect("query should succeed");

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row["id"], Value::Integer(1));
        assert_eq!(row["name"], Value::from("one"));
        assert_eq!(row["ratio"], Value::Real(0.5));
        assert_eq!(row["payload"], Value::Blob(b"hi".to_vec()));
        assert_eq!(row["note"], Value::Null);
    }

    #[tokio::test]
    async fn test_preserves_projection_order() {
        let executor = setup().await;
        let rows = executor
            .execute("SELECT note, name, id FROM sample", &[])
            .await
            .unwrap();
        let columns: Vec<_> = rows[0].keys().cloned().collect();
        assert_eq!(columns, vec!["note", "name", "id"]);
    }

    #[tokio::test]
    async fn test_binds_parameters() {
        let executor = setup().await;
        let rows = executor
            .execute(
                "SELECT id FROM sample WHERE name = ? AND id > ?",
                &[Value::from("one"), Value::Integer(0)],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let none = executor
            .execute("SELECT id FROM sample WHERE id > ?", &[Value::Integer(1)])
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_missing_table_is_execution_error() {
        let executor = setup().await;
        let err = executor
            .execute("SELECT id FROM does_not_exist", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Execution(_)));
    }
}
