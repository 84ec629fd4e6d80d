//! Pipeline stage identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The five stages of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    ArchiveRaw,
    Transform,
    ArchiveClean,
    Load,
}

impl Stage {
    /// All stages in the order the orchestrator drives them.
    pub const ORDER: [Stage; 5] = [
        Stage::Fetch,
        Stage::ArchiveRaw,
        Stage::Transform,
        Stage::ArchiveClean,
        Stage::Load,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetch => "fetch",
            Self::ArchiveRaw => "archive_raw",
            Self::Transform => "transform",
            Self::ArchiveClean => "archive_clean",
            Self::Load => "load",
        };
        f.write_str(s)
    }
}
