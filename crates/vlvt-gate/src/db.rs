//! Persistence collaborator.
//!
//! Guards only read through [`QueryExecutor`]; the schema belongs to the
//! services that own users and subscriptions.

use anyhow::Context;
use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, params_from_iter};
use serde_json::{Map, Number, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// One result row, keyed by column name
pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Unsupported query parameter: {0}")]
    UnsupportedParam(String),

    #[error("Database connection lock poisoned")]
    Poisoned,

    #[error("Database task failed: {0}")]
    Task(String),
}

/// Parameterized query capability
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError>;
}

/// `rusqlite` executor; queries run on the blocking pool
#[derive(Clone)]
pub struct SqliteExecutor {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteExecutor {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run a statement batch directly (schema setup, fixtures)
    pub fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Poisoned)?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let params = params
            .iter()
            .map(to_sql_value)
            .collect::<Result<Vec<_>, _>>()?;

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| DbError::Poisoned)?;
            run_query(&conn, &sql, params)
        })
        .await
        .map_err(|e| DbError::Task(e.to_string()))?
    }
}

fn run_query(conn: &Connection, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(params))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (idx, name) in columns.iter().enumerate() {
            record.insert(name.clone(), from_sql_value(row.get_ref(idx)?));
        }
        out.push(record);
    }
    Ok(out)
}

fn to_sql_value(value: &Value) -> Result<SqlValue, DbError> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n
                .as_f64()
                .map(SqlValue::Real)
                .ok_or_else(|| DbError::UnsupportedParam(n.to_string()))?,
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => return Err(DbError::UnsupportedParam(other.to_string())),
    })
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(hex::encode(b)),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sqlite_rows_as_json() {
        let db = SqliteExecutor::in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE users (id TEXT PRIMARY KEY, id_verified INTEGER, bio TEXT, score REAL);
             INSERT INTO users VALUES ('u1', 1, 'hi', 4.5), ('u2', 0, NULL, NULL);",
        )
        .unwrap();

        let rows = tokio_test::block_on(db.execute(
            "SELECT id, id_verified, bio, score FROM users WHERE id = ?1",
            &[json!("u1")],
        ))
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "u1");
        assert_eq!(rows[0]["id_verified"], 1);
        assert_eq!(rows[0]["bio"], "hi");
        assert_eq!(rows[0]["score"], 4.5);

        let rows = tokio_test::block_on(db.execute(
            "SELECT bio FROM users WHERE id_verified = ?1",
            &[json!(false)],
        ))
        .unwrap();
        assert_eq!(rows, vec![mock::row(&[("bio", Value::Null)])]);
    }

    #[test]
    fn test_bad_sql_is_an_error() {
        let db = SqliteExecutor::in_memory().unwrap();
        let result = tokio_test::block_on(db.execute("SELECT * FROM missing", &[]));
        assert!(matches!(result, Err(DbError::Sqlite(_))));
    }

    #[test]
    fn test_nested_params_rejected() {
        let db = SqliteExecutor::in_memory().unwrap();
        let result = tokio_test::block_on(db.execute("SELECT ?1", &[json!({"a": 1})]));
        assert!(matches!(result, Err(DbError::UnsupportedParam(_))));
    }
}
