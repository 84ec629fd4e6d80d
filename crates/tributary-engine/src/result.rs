//! Run result types and timing breakdowns.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::transform::{CleanedRecordSet, TransformStats};

/// Wall-clock seconds spent in each stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub fetch_secs: f64,
    pub archive_raw_secs: f64,
    pub transform_secs: f64,
    pub archive_clean_secs: f64,
    pub load_secs: f64,
    pub total_secs: f64,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub dataset: String,
    pub started_at: DateTime<Utc>,
    pub raw_bytes: u64,
    pub clean_bytes: u64,
    pub transform: TransformStats,
    pub table: String,
    pub rows_loaded: u64,
    pub timings: StageTimings,
}

impl RunSummary {
    /// One-line description used as the success status message.
    pub fn headline(&self) -> String {
        format!(
            "{}: {} records parsed, {} cleaned, {} rows loaded into {} in {:.2}s",
            self.dataset,
            self.transform.parsed,
            self.transform.emitted,
            self.rows_loaded,
            self.table,
            self.timings.total_secs
        )
    }
}

/// Result of a fetch + transform dry run.
#[derive(Debug, Clone)]
pub struct Preview {
    pub dataset: String,
    pub raw_bytes: u64,
    pub cleaned: CleanedRecordSet,
}
