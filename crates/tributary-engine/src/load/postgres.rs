//! PostgreSQL connector.
//!
//! JSON values are bound according to the parameter types the server reports
//! for the prepared INSERT, so a `TEXT[]` column receives a text array and a
//! `JSONB` column receives the value as-is.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Config as PgConfig, NoTls, Statement};

use super::{Connection, Connector};
use crate::errors::{ConnError, DbError};

/// PostgreSQL connection settings from the run config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    #[serde(default)]
    pub connect_timeout_seconds: Option<u64>,
}

fn default_port() -> u16 {
    5432
}

impl PostgresConfig {
    fn pg_config(&self) -> PgConfig {
        let mut pg = PgConfig::new();
        pg.host(&self.host);
        pg.port(self.port);
        pg.user(&self.user);
        if !self.password.is_empty() {
            pg.password(&self.password);
        }
        pg.dbname(&self.database);
        if let Some(secs) = self.connect_timeout_seconds {
            pg.connect_timeout(Duration::from_secs(secs));
        }
        pg
    }
}

#[derive(Debug, Clone)]
pub struct PostgresConnector {
    config: PostgresConfig,
}

impl PostgresConnector {
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnError> {
        let (client, connection) = self
            .config
            .pg_config()
            .connect(NoTls)
            .await
            .map_err(|e| ConnError {
                target: self.target(),
                source: e.into(),
            })?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection error");
            }
        });

        Ok(Box::new(PostgresConnection {
            client,
            statements: HashMap::new(),
            driver,
        }))
    }

    fn target(&self) -> String {
        format!(
            "postgres://{}:{}/{}",
            self.config.host, self.config.port, self.config.database
        )
    }
}

struct PostgresConnection {
    client: Client,
    statements: HashMap<String, Statement>,
    driver: JoinHandle<()>,
}

impl PostgresConnection {
    async fn statement(&mut self, sql: &str) -> Result<Statement, DbError> {
        if let Some(stmt) = self.statements.get(sql) {
            return Ok(stmt.clone());
        }
        let stmt = self.client.prepare(sql).await?;
        self.statements.insert(sql.to_string(), stmt.clone());
        Ok(stmt)
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn begin(&mut self) -> Result<(), DbError> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        let stmt = self.statement(sql).await?;
        let types = stmt.params();
        if types.len() != params.len() {
            return Err(DbError::ParamCount {
                expected: types.len(),
                actual: params.len(),
            });
        }

        let bound = types
            .iter()
            .zip(params)
            .enumerate()
            .map(|(i, (ty, value))| PgParam::coerce(i + 1, ty, value))
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(PgParam::as_tosql).collect();

        Ok(self.client.execute(&stmt, &refs).await?)
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        let Self { client, driver, .. } = *self;
        drop(client);
        driver
            .await
            .map_err(|e| DbError::Other(format!("connection task failed: {e}")))
    }
}

// ── PgParam: typed INSERT bind parameters ────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum PgParam {
    Bool(Option<bool>),
    Int2(Option<i16>),
    Int4(Option<i32>),
    Int8(Option<i64>),
    Float4(Option<f32>),
    Float8(Option<f64>),
    Text(Option<String>),
    TextArray(Option<Vec<String>>),
    Json(Option<Value>),
}

impl PgParam {
    fn as_tosql(&self) -> &(dyn ToSql + Sync) {
        match self {
            Self::Bool(v) => v,
            Self::Int2(v) => v,
            Self::Int4(v) => v,
            Self::Int8(v) => v,
            Self::Float4(v) => v,
            Self::Float8(v) => v,
            Self::Text(v) => v,
            Self::TextArray(v) => v,
            Self::Json(v) => v,
        }
    }

    /// Convert `value` for a parameter of type `ty`. `index` is 1-based.
    fn coerce(index: usize, ty: &Type, value: &Value) -> Result<Self, DbError> {
        let mismatch = || DbError::Coercion {
            index,
            ty: ty.name().to_string(),
            value: value.to_string(),
        };
        let null = value.is_null();

        let param = match *ty {
            Type::BOOL => Self::Bool(if null {
                None
            } else {
                Some(value.as_bool().ok_or_else(mismatch)?)
            }),
            Type::INT2 => Self::Int2(if null {
                None
            } else {
                Some(i16::try_from(as_int(value).ok_or_else(mismatch)?).map_err(|_| mismatch())?)
            }),
            Type::INT4 => Self::Int4(if null {
                None
            } else {
                Some(i32::try_from(as_int(value).ok_or_else(mismatch)?).map_err(|_| mismatch())?)
            }),
            Type::INT8 => Self::Int8(if null {
                None
            } else {
                Some(as_int(value).ok_or_else(mismatch)?)
            }),
            #[allow(clippy::cast_possible_truncation)]
            Type::FLOAT4 => Self::Float4(if null {
                None
            } else {
                Some(as_float(value).ok_or_else(mismatch)? as f32)
            }),
            Type::FLOAT8 => Self::Float8(if null {
                None
            } else {
                Some(as_float(value).ok_or_else(mismatch)?)
            }),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                Self::Text(if null { None } else { Some(as_text(value)) })
            }
            Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => Self::TextArray(match value {
                Value::Null => None,
                Value::Array(items) => Some(items.iter().map(as_text).collect()),
                _ => return Err(mismatch()),
            }),
            Type::JSON | Type::JSONB => Self::Json(if null { None } else { Some(value.clone()) }),
            _ => return Err(mismatch()),
        };
        Ok(param)
    }
}

/// Integral JSON numbers, plus numeric strings such as `"12"`.
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Strings bind verbatim; other values bind as their JSON text.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn text_columns_take_strings_and_serialize_the_rest() {
        assert_eq!(
            PgParam::coerce(1, &Type::TEXT, &json!("Attack on Titan")).unwrap(),
            PgParam::Text(Some("Attack on Titan".into()))
        );
        assert_eq!(
            PgParam::coerce(1, &Type::VARCHAR, &json!(["a", "b"])).unwrap(),
            PgParam::Text(Some(r#"["a","b"]"#.into()))
        );
        assert_eq!(
            PgParam::coerce(1, &Type::TEXT, &json!(25)).unwrap(),
            PgParam::Text(Some("25".into()))
        );
    }

    #[test]
    fn null_binds_as_typed_null() {
        assert_eq!(PgParam::coerce(1, &Type::INT4, &Value::Null).unwrap(), PgParam::Int4(None));
        assert_eq!(PgParam::coerce(1, &Type::TEXT, &Value::Null).unwrap(), PgParam::Text(None));
        assert_eq!(
            PgParam::coerce(1, &Type::TEXT_ARRAY, &Value::Null).unwrap(),
            PgParam::TextArray(None)
        );
    }

    #[test]
    fn integers_are_range_checked() {
        assert_eq!(PgParam::coerce(2, &Type::INT4, &json!(12)).unwrap(), PgParam::Int4(Some(12)));
        assert_eq!(PgParam::coerce(2, &Type::INT8, &json!("7")).unwrap(), PgParam::Int8(Some(7)));

        let err = PgParam::coerce(2, &Type::INT2, &json!(70_000)).unwrap_err();
        assert!(matches!(err, DbError::Coercion { index: 2, .. }), "got: {err}");
        let err = PgParam::coerce(3, &Type::INT4, &json!(1.5)).unwrap_err();
        assert!(err.to_string().contains("$3"), "got: {err}");
    }

    #[test]
    fn genres_bind_as_text_array() {
        assert_eq!(
            PgParam::coerce(5, &Type::TEXT_ARRAY, &json!(["Action", "Drama"])).unwrap(),
            PgParam::TextArray(Some(vec!["Action".into(), "Drama".into()]))
        );
        assert!(PgParam::coerce(5, &Type::TEXT_ARRAY, &json!("Action")).is_err());
    }

    #[test]
    fn json_columns_take_any_value() {
        let value = json!({"region": "The North"});
        assert_eq!(
            PgParam::coerce(1, &Type::JSONB, &value).unwrap(),
            PgParam::Json(Some(value))
        );
    }

    #[test]
    fn bool_and_float() {
        assert_eq!(PgParam::coerce(1, &Type::BOOL, &json!(true)).unwrap(), PgParam::Bool(Some(true)));
        assert!(PgParam::coerce(1, &Type::BOOL, &json!("yes")).is_err());
        assert_eq!(
            PgParam::coerce(1, &Type::FLOAT8, &json!(8.75)).unwrap(),
            PgParam::Float8(Some(8.75))
        );
    }

    #[test]
    fn unsupported_type_is_a_coercion_error() {
        let err = PgParam::coerce(4, &Type::BYTEA, &json!("x")).unwrap_err();
        assert!(err.to_string().contains("bytea"), "got: {err}");
    }

    #[test]
    fn config_defaults() {
        let config: PostgresConfig =
            serde_yaml::from_str("host: db.internal\nuser: etl\ndatabase: warehouse\n").unwrap();
        assert_eq!(config.port, 5432);
        assert!(config.password.is_empty());
        assert_eq!(
            PostgresConnector::new(config).target(),
            "postgres://db.internal:5432/warehouse"
        );
    }
}
