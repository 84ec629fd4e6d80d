//! Relational collaborator and the all-or-nothing batch loader.
//!
//! A load opens one connection and one transaction. Every record becomes one
//! parameterized INSERT; the first failure rolls the whole batch back.
//!
//! Transaction lifecycle: `Idle` (connected) → `TransactionOpen`
//! (`LoadSession::begin`) → `Committed` / `RolledBack` (the consuming
//! `LoadSession::commit` / `LoadSession::rollback`) → `Closed`
//! ([`Connection::close`]). If the load future is dropped mid-batch the
//! connection is dropped with the transaction still open, and the driver
//! discards it.

pub mod postgres;
pub mod sqlite;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use pg_escape::quote_identifier;
use serde::Serialize;
use serde_json::Value;
use tributary_types::{Record, TableMapping};

use crate::errors::{ConnError, DbError, LoadError, PipelineError};

pub use postgres::{PostgresConfig, PostgresConnector};
pub use sqlite::{SqliteConfig, SqliteConnector};

/// Opens relational connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ConnError`] when no connection can be established.
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnError>;

    /// Human-readable target for logs, without credentials.
    fn target(&self) -> String;
}

/// One open relational connection.
#[async_trait]
pub trait Connection: Send {
    async fn begin(&mut self) -> Result<(), DbError>;

    /// Execute `sql` with `$1..$n` bound to `params`. Returns affected rows.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError>;

    async fn commit(&mut self) -> Result<(), DbError>;

    async fn rollback(&mut self) -> Result<(), DbError>;

    async fn close(self: Box<Self>) -> Result<(), DbError>;
}

/// Outcome of a committed load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadSummary {
    pub table: String,
    pub rows_written: u64,
    pub duration_secs: f64,
}

/// Parameterized INSERT for one table, built once per load.
#[derive(Debug, Clone)]
pub(crate) struct InsertStatement {
    table: String,
    sql: String,
    columns: Vec<(String, String)>,
}

impl InsertStatement {
    pub(crate) fn new(table: &TableMapping) -> Self {
        let target = match &table.schema {
            Some(schema) => format!(
                "{}.{}",
                quote_identifier(schema),
                quote_identifier(&table.name)
            ),
            None => quote_identifier(&table.name).into_owned(),
        };
        let col_list = table
            .column_names()
            .map(quote_identifier)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=table.columns.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            table: table.display_name(),
            sql: format!("INSERT INTO {target} ({col_list}) VALUES ({placeholders})"),
            columns: table
                .columns
                .iter()
                .map(|c| (c.column.clone(), c.source_field().to_string()))
                .collect(),
        }
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    /// Values of `record` in column order.
    fn bind(&self, row: usize, record: &Record) -> Result<Vec<Value>, LoadError> {
        self.columns
            .iter()
            .map(|(column, field)| {
                record.get(field).cloned().ok_or_else(|| LoadError::MissingField {
                    table: self.table.clone(),
                    row,
                    column: column.clone(),
                    field: field.clone(),
                })
            })
            .collect()
    }
}

/// An open transaction on a borrowed connection.
pub(crate) struct LoadSession<'a> {
    conn: &'a mut dyn Connection,
    insert: &'a InsertStatement,
    rows_written: u64,
}

impl<'a> LoadSession<'a> {
    /// BEGIN the batch transaction.
    async fn begin(
        conn: &'a mut dyn Connection,
        insert: &'a InsertStatement,
    ) -> Result<LoadSession<'a>, LoadError> {
        conn.begin().await.map_err(|source| LoadError::Begin {
            table: insert.table.clone(),
            source,
        })?;
        Ok(LoadSession {
            conn,
            insert,
            rows_written: 0,
        })
    }

    async fn insert(&mut self, row: usize, record: &Record) -> Result<(), LoadError> {
        let params = self.insert.bind(row, record)?;
        let affected = self
            .conn
            .execute(self.insert.sql(), &params)
            .await
            .map_err(|source| LoadError::Insert {
                table: self.insert.table.clone(),
                row,
                source,
            })?;
        self.rows_written += affected;
        Ok(())
    }

    /// COMMIT. A failed commit is followed by a best-effort ROLLBACK.
    async fn commit(mut self) -> Result<u64, LoadError> {
        if let Err(source) = self.conn.commit().await {
            if let Err(e) = self.conn.rollback().await {
                tracing::warn!(table = %self.insert.table, error = %e, "ROLLBACK after failed COMMIT also failed");
            }
            return Err(LoadError::Commit {
                table: self.insert.table.clone(),
                source,
            });
        }
        Ok(self.rows_written)
    }

    /// ROLLBACK. Failures are logged; the caller reports the original cause.
    async fn rollback(mut self) {
        match self.conn.rollback().await {
            Ok(()) => tracing::warn!(
                table = %self.insert.table,
                discarded_rows = self.rows_written,
                "Load rolled back"
            ),
            Err(e) => tracing::error!(table = %self.insert.table, error = %e, "ROLLBACK failed"),
        }
    }
}

/// Loads cleaned records into their target table in one transaction.
#[derive(Clone)]
pub struct Loader {
    connector: Arc<dyn Connector>,
}

impl Loader {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Insert all `records` or none of them.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Conn`] if the connection cannot be opened (nothing
    /// to roll back or close), otherwise [`PipelineError::Load`] with the
    /// original driver error after the transaction has been rolled back.
    pub async fn load(
        &self,
        records: &[Record],
        table: &TableMapping,
    ) -> Result<LoadSummary, PipelineError> {
        let insert = InsertStatement::new(table);
        let mut conn = self.connector.connect().await?;
        tracing::debug!(target_db = %self.connector.target(), table = %insert.table, "Connected for load");

        let started = Instant::now();
        let result = write_all(conn.as_mut(), &insert, records).await;
        let duration_secs = started.elapsed().as_secs_f64();

        if let Err(e) = conn.close().await {
            tracing::warn!(table = %insert.table, error = %e, "Closing connection failed");
        }

        let rows_written = result?;
        tracing::info!(table = %insert.table, rows = rows_written, "Load committed");
        Ok(LoadSummary {
            table: insert.table,
            rows_written,
            duration_secs,
        })
    }
}

async fn write_all(
    conn: &mut dyn Connection,
    insert: &InsertStatement,
    records: &[Record],
) -> Result<u64, LoadError> {
    let mut session = LoadSession::begin(conn, insert).await?;

    for (row, record) in records.iter().enumerate() {
        if let Err(e) = session.insert(row, record).await {
            session.rollback().await;
            return Err(e);
        }
    }

    session.commit().await
}
