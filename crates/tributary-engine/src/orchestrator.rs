//! Pipeline orchestrator: fetch → archive raw → transform → archive clean → load.
//!
//! Stages run strictly in order and the first failure stops the run. Snapshots
//! already written stay in place; only the load is transactional.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tributary_types::{DatasetDescriptor, Stage};

use crate::archive::Archiver;
use crate::errors::StageFailure;
use crate::fetch::{FetchRequest, Fetcher};
use crate::load::{Connector, Loader};
use crate::result::{Preview, RunSummary, StageTimings};
use crate::transform::transform;

/// Collaborators for one or more runs. Datasets differ only by descriptor.
#[derive(Clone)]
pub struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    archiver: Archiver,
    loader: Loader,
}

impl Pipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, archiver: Archiver, connector: Arc<dyn Connector>) -> Self {
        Self {
            fetcher,
            archiver,
            loader: Loader::new(connector),
        }
    }

    /// Run every stage for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns the first [`StageFailure`]; later stages are not attempted.
    pub async fn run(
        &self,
        request: &FetchRequest,
        descriptor: &DatasetDescriptor,
    ) -> Result<RunSummary, StageFailure> {
        let result = self.run_stages(request, descriptor).await;
        if let Err(failure) = &result {
            tracing::error!(
                dataset = %descriptor.name,
                stage = %failure.stage,
                kind = failure.error.kind(),
                error = %failure.error,
                "Pipeline run failed"
            );
        }
        result
    }

    async fn run_stages(
        &self,
        request: &FetchRequest,
        descriptor: &DatasetDescriptor,
    ) -> Result<RunSummary, StageFailure> {
        let started_at = Utc::now();
        let run_start = Instant::now();
        let mut timings = StageTimings::default();
        tracing::info!(dataset = %descriptor.name, url = %request.url, "Starting pipeline run");

        let t = Instant::now();
        let raw = self
            .fetcher
            .fetch(request)
            .await
            .map_err(|e| StageFailure::new(Stage::Fetch, e))?;
        timings.fetch_secs = t.elapsed().as_secs_f64();
        tracing::info!(dataset = %descriptor.name, bytes = raw.len(), "Fetched payload");

        let t = Instant::now();
        let raw_bytes = self
            .archiver
            .archive_raw(&raw, &descriptor.raw_key)
            .await
            .map_err(|e| StageFailure::new(Stage::ArchiveRaw, e))?;
        timings.archive_raw_secs = t.elapsed().as_secs_f64();

        let t = Instant::now();
        let cleaned =
            transform(&raw, descriptor).map_err(|e| StageFailure::new(Stage::Transform, e))?;
        timings.transform_secs = t.elapsed().as_secs_f64();
        tracing::info!(
            dataset = %descriptor.name,
            parsed = cleaned.stats.parsed,
            emitted = cleaned.stats.emitted,
            "Transformed records"
        );

        let t = Instant::now();
        let clean_bytes = self
            .archiver
            .archive_clean(&cleaned, &descriptor.clean_key)
            .await
            .map_err(|e| StageFailure::new(Stage::ArchiveClean, e))?;
        timings.archive_clean_secs = t.elapsed().as_secs_f64();

        let t = Instant::now();
        let load = self
            .loader
            .load(&cleaned.records, &descriptor.table)
            .await
            .map_err(|e| StageFailure::new(Stage::Load, e))?;
        timings.load_secs = t.elapsed().as_secs_f64();
        timings.total_secs = run_start.elapsed().as_secs_f64();

        let summary = RunSummary {
            dataset: descriptor.name.clone(),
            started_at,
            raw_bytes,
            clean_bytes,
            transform: cleaned.stats,
            table: load.table,
            rows_loaded: load.rows_written,
            timings,
        };
        tracing::info!(
            dataset = %summary.dataset,
            rows_loaded = summary.rows_loaded,
            duration_secs = summary.timings.total_secs,
            "Pipeline run complete"
        );
        Ok(summary)
    }

    /// Fetch and transform without writing anything.
    ///
    /// # Errors
    ///
    /// Returns a [`StageFailure`] for the fetch or transform stage.
    pub async fn preview(
        &self,
        request: &FetchRequest,
        descriptor: &DatasetDescriptor,
    ) -> Result<Preview, StageFailure> {
        let raw = self
            .fetcher
            .fetch(request)
            .await
            .map_err(|e| StageFailure::new(Stage::Fetch, e))?;
        let cleaned =
            transform(&raw, descriptor).map_err(|e| StageFailure::new(Stage::Transform, e))?;
        tracing::info!(dataset = %descriptor.name, records = cleaned.len(), "Preview complete");
        Ok(Preview {
            dataset: descriptor.name.clone(),
            raw_bytes: raw.len() as u64,
            cleaned,
        })
    }
}
