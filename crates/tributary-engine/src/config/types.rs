//! Run file model.

use serde::{Deserialize, Serialize};
use tributary_types::{presets, DatasetDescriptor};

use crate::fetch::FetchRequest;
use crate::load::{PostgresConfig, SqliteConfig};

/// Top-level run file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub version: String,
    pub dataset: DatasetRef,
    pub source: FetchRequest,
    pub archive: ArchiveConfig,
    pub destination: DestinationConfig,
}

/// Either a built-in preset name or a full inline descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatasetRef {
    Preset(String),
    Inline(Box<DatasetDescriptor>),
}

impl DatasetRef {
    /// The descriptor this reference names, or `None` for an unknown preset.
    pub fn resolve(&self) -> Option<DatasetDescriptor> {
        match self {
            Self::Preset(name) => presets::by_name(name),
            Self::Inline(descriptor) => Some(descriptor.as_ref().clone()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Preset(name) => name,
            Self::Inline(descriptor) => &descriptor.name,
        }
    }
}

/// Store URLs for the two snapshots. They may be the same store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub raw: String,
    pub clean: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DestinationConfig {
    Postgres(PostgresConfig),
    Sqlite(SqliteConfig),
}

impl DestinationConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Sqlite(_) => "sqlite",
        }
    }
}
