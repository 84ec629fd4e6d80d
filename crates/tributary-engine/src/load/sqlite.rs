//! SQLite connector for local runs and tests.
//!
//! The INSERT text is shared with PostgreSQL: SQLite reads `$1..$n` as
//! named parameters numbered in order of appearance.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Connection, Connector};
use crate::errors::{ConnError, DbError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<rusqlite::Connection, DbError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(rusqlite::Connection::open(&self.path)?)
    }
}

impl From<&SqliteConfig> for SqliteConnector {
    fn from(config: &SqliteConfig) -> Self {
        Self::new(config.path.clone())
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnError> {
        let conn = self.open().map_err(|source| ConnError {
            target: self.target(),
            source,
        })?;
        Ok(Box::new(SqliteConnection { conn }))
    }

    fn target(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }
}

struct SqliteConnection {
    conn: rusqlite::Connection,
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn begin(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let expected = stmt.parameter_count();
        if expected != params.len() {
            return Err(DbError::ParamCount {
                expected,
                actual: params.len(),
            });
        }
        let affected = stmt.execute(rusqlite::params_from_iter(params.iter().map(to_sql_value)))?;
        Ok(affected as u64)
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        self.conn.close().map_err(|(_, e)| DbError::Sqlite(e))
    }
}

/// SQLite has no array or document type; those are stored as JSON text.
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}
