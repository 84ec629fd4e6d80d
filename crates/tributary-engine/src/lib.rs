//! Core pipeline crate for Tributary: collaborators, transformer, loader and
//! the orchestrator that runs them in order.

pub mod archive;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod handler;
pub mod load;
pub mod orchestrator;
pub mod result;
pub mod transform;

// Re-export public API for convenience
pub use archive::{Archiver, BlobStore, ObjectBlobStore};
pub use errors::{PipelineError, StageFailure};
pub use fetch::{FetchRequest, Fetcher, HttpFetcher};
pub use handler::{Handler, InvocationStatus};
pub use load::{Connection, Connector, Loader, LoadSummary};
pub use orchestrator::Pipeline;
pub use result::{Preview, RunSummary, StageTimings};
pub use transform::{transform, CleanedRecordSet, TransformStats};
