//! Error taxonomy for pipeline stages.
//!
//! Each collaborator has its own error type. [`PipelineError`] unifies them
//! and [`StageFailure`] records which stage produced the error.

use tributary_types::Stage;

/// The remote API could not be read.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// The payload did not have the shape the descriptor expects.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("records path '{path}' not found in payload")]
    PathNotFound { path: String },
    #[error("records path '{path}' holds {found}, expected a list")]
    NotAList { path: String, found: &'static str },
    #[error("record {index} is {found}, expected an object")]
    NotAnObject { index: usize, found: &'static str },
    #[error("cleaned record {row} has no field '{field}' for column '{column}'")]
    MissingColumn {
        row: usize,
        column: String,
        field: String,
    },
}

/// A snapshot could not be written to the blob store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid blob key '{key}': {source}")]
    InvalidKey {
        key: String,
        #[source]
        source: object_store::path::Error,
    },
    #[error("failed to write '{key}': {source}")]
    Put {
        key: String,
        #[source]
        source: object_store::Error,
    },
    #[error("failed to serialize clean snapshot: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("unsupported store url '{url}' (expected s3://, file:// or memory://)")]
    UnsupportedUrl { url: String },
    #[error("failed to open store '{url}': {source}")]
    Open {
        url: String,
        #[source]
        source: object_store::Error,
    },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by a relational driver.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("postgres: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot bind {value} to parameter ${index} of type {ty}")]
    Coercion {
        index: usize,
        ty: String,
        value: String,
    },
    #[error("statement expects {expected} parameters, got {actual}")]
    ParamCount { expected: usize, actual: usize },
    #[error("{0}")]
    Other(String),
}

/// No relational connection could be established.
#[derive(Debug, thiserror::Error)]
#[error("cannot connect to {target}: {source}")]
pub struct ConnError {
    pub target: String,
    #[source]
    pub source: DbError,
}

/// The batch transaction failed and was rolled back.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("BEGIN on {table} failed: {source}")]
    Begin {
        table: String,
        #[source]
        source: DbError,
    },
    #[error("insert into {table} failed at row {row}: {source}")]
    Insert {
        table: String,
        row: usize,
        #[source]
        source: DbError,
    },
    #[error("row {row} has no field '{field}' for column '{column}' of {table}")]
    MissingField {
        table: String,
        row: usize,
        column: String,
        field: String,
    },
    #[error("COMMIT on {table} failed: {source}")]
    Commit {
        table: String,
        #[source]
        source: DbError,
    },
}

impl LoadError {
    /// The driver error behind this failure, if any.
    pub fn cause(&self) -> Option<&DbError> {
        match self {
            Self::Begin { source, .. } | Self::Insert { source, .. } | Self::Commit { source, .. } => {
                Some(source)
            }
            Self::MissingField { .. } => None,
        }
    }

    /// Index of the failing record, when a single row is to blame.
    pub fn row(&self) -> Option<usize> {
        match self {
            Self::Insert { row, .. } | Self::MissingField { row, .. } => Some(*row),
            Self::Begin { .. } | Self::Commit { .. } => None,
        }
    }
}

/// Any error a pipeline run can end with.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Conn(#[from] ConnError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl PipelineError {
    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch_error",
            Self::Parse(_) => "parse_error",
            Self::Storage(_) => "storage_error",
            Self::Conn(_) => "conn_error",
            Self::Load(_) => "load_error",
        }
    }
}

/// The stage a run stopped at, and why.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed ({}): {error}", .error.kind())]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
}

impl StageFailure {
    pub fn new(stage: Stage, error: impl Into<PipelineError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_failure_display_names_stage_and_kind() {
        let failure = StageFailure::new(
            Stage::Fetch,
            FetchError::Status {
                url: "https://api.example.com/anime".into(),
                status: 503,
            },
        );
        let msg = failure.to_string();
        assert!(msg.starts_with("fetch stage failed (fetch_error)"), "{msg}");
        assert!(msg.contains("HTTP 503"));
    }

    #[test]
    fn load_error_keeps_original_cause() {
        let err = LoadError::Insert {
            table: "anime_table".into(),
            row: 10,
            source: DbError::Other("NOT NULL constraint failed".into()),
        };
        assert_eq!(err.row(), Some(10));
        assert!(err.cause().unwrap().to_string().contains("NOT NULL"));
        let wrapped = PipelineError::from(err);
        assert_eq!(wrapped.kind(), "load_error");
        assert!(wrapped.to_string().contains("row 10"));
    }

    #[test]
    fn conn_error_is_distinct_from_load_error() {
        let err = PipelineError::from(ConnError {
            target: "db.internal:5432/etl".into(),
            source: DbError::Other("connection refused".into()),
        });
        assert_eq!(err.kind(), "conn_error");
        assert!(err.to_string().contains("db.internal:5432/etl"));
    }

    #[test]
    fn missing_field_has_no_driver_cause() {
        let err = LoadError::MissingField {
            table: "t".into(),
            row: 0,
            column: "c".into(),
            field: "f".into(),
        };
        assert!(err.cause().is_none());
    }
}
