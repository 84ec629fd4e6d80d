//! Semantic validation for parsed run configuration values.

use anyhow::{bail, Result};
use tributary_types::{presets, DatasetDescriptor};
use url::Url;

use crate::config::types::{DatasetRef, DestinationConfig, RunConfig};

const STORE_SCHEMES: [&str; 3] = ["s3", "file", "memory"];

fn validate_store_url(url: &str, context: &str, errors: &mut Vec<String>) {
    match Url::parse(url) {
        Ok(parsed) if STORE_SCHEMES.contains(&parsed.scheme()) => {
            if parsed.scheme() == "s3" && parsed.host_str().map_or(true, str::is_empty) {
                errors.push(format!("{context}: s3 url '{url}' has no bucket"));
            }
        }
        Ok(parsed) => errors.push(format!(
            "{context}: unsupported scheme '{}' (expected s3, file or memory)",
            parsed.scheme()
        )),
        Err(e) => errors.push(format!("{context}: invalid url '{url}': {e}")),
    }
}

fn validate_descriptor(descriptor: &DatasetDescriptor, errors: &mut Vec<String>) {
    if let Err(e) = descriptor.validate() {
        errors.extend(e.problems.into_iter().map(|p| format!("dataset: {p}")));
    }
}

fn require(value: &str, field: &str, errors: &mut Vec<String>) {
    if value.trim().is_empty() {
        errors.push(format!("destination.{field} must not be empty"));
    }
}

/// Validate a parsed run configuration, including its dataset descriptor.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the run config.
pub fn validate_run(config: &RunConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported run file version '{}', expected '1.0'",
            config.version
        ));
    }

    match &config.dataset {
        DatasetRef::Preset(name) => match presets::by_name(name) {
            Some(descriptor) => validate_descriptor(&descriptor, &mut errors),
            None => errors.push(format!(
                "Unknown dataset preset '{name}' (available: {})",
                presets::NAMES.join(", ")
            )),
        },
        DatasetRef::Inline(descriptor) => validate_descriptor(descriptor, &mut errors),
    }

    let source_url = config.source.url.trim();
    if source_url.is_empty() {
        errors.push("source.url must not be empty".to_string());
    } else {
        match Url::parse(source_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!(
                "source.url: unsupported scheme '{}' (expected http or https)",
                url.scheme()
            )),
            Err(e) => errors.push(format!("source.url: invalid url '{source_url}': {e}")),
        }
    }
    if config.source.timeout_seconds == Some(0) {
        errors.push("source.timeout_seconds must be > 0".to_string());
    }

    validate_store_url(&config.archive.raw, "archive.raw", &mut errors);
    validate_store_url(&config.archive.clean, "archive.clean", &mut errors);

    match &config.destination {
        DestinationConfig::Postgres(pg) => {
            require(&pg.host, "host", &mut errors);
            require(&pg.user, "user", &mut errors);
            require(&pg.database, "database", &mut errors);
            if pg.port == 0 {
                errors.push("destination.port must be > 0".to_string());
            }
            if pg.connect_timeout_seconds == Some(0) {
                errors.push("destination.connect_timeout_seconds must be > 0".to_string());
            }
        }
        DestinationConfig::Sqlite(sqlite) => {
            if sqlite.path.as_os_str().is_empty() {
                errors.push("destination.path must not be empty".to_string());
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Run validation failed:\n  - {}", errors.join("\n  - "));
    }
}
