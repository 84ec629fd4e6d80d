//! Run file parsing, validation and collaborator assembly.

pub mod parser;
pub mod types;
pub mod validator;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::archive::{Archiver, BlobStore, ObjectBlobStore};
use crate::fetch::HttpFetcher;
use crate::handler::Handler;
use crate::load::{Connector, PostgresConnector, SqliteConnector};
use crate::orchestrator::Pipeline;
use types::{DestinationConfig, RunConfig};

/// Parse and validate a run file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
pub fn load_run(path: &Path) -> Result<RunConfig> {
    let config = parser::parse_run(path)?;
    validator::validate_run(&config)?;
    Ok(config)
}

/// Build the collaborators a validated run file describes and bind them to
/// its dataset.
///
/// # Errors
///
/// Returns an error if the dataset cannot be resolved or a store cannot be
/// opened.
pub fn assemble(config: &RunConfig) -> Result<Handler> {
    let descriptor = config
        .dataset
        .resolve()
        .with_context(|| format!("Unknown dataset preset '{}'", config.dataset.label()))?;

    let raw: Arc<dyn BlobStore> = Arc::new(
        ObjectBlobStore::from_url(&config.archive.raw)
            .with_context(|| format!("Failed to open raw archive {}", config.archive.raw))?,
    );
    let archiver = if config.archive.clean == config.archive.raw {
        Archiver::shared(raw)
    } else {
        let clean: Arc<dyn BlobStore> = Arc::new(
            ObjectBlobStore::from_url(&config.archive.clean)
                .with_context(|| format!("Failed to open clean archive {}", config.archive.clean))?,
        );
        Archiver::new(raw, clean)
    };

    let connector: Arc<dyn Connector> = match &config.destination {
        DestinationConfig::Postgres(pg) => Arc::new(PostgresConnector::new(pg.clone())),
        DestinationConfig::Sqlite(sqlite) => Arc::new(SqliteConnector::from(sqlite)),
    };

    tracing::debug!(
        dataset = %descriptor.name,
        destination = %connector.target(),
        "Assembled pipeline"
    );

    let pipeline = Pipeline::new(Arc::new(HttpFetcher::new()), archiver, connector);
    Ok(Handler::new(
        Arc::new(pipeline),
        config.source.clone(),
        descriptor,
    ))
}
