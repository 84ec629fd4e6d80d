//! Invocation entry point: turns a run into a `{code, message}` status.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::task::AbortOnDropHandle;
use tributary_types::{DatasetDescriptor, Stage};

use crate::errors::StageFailure;
use crate::fetch::FetchRequest;
use crate::orchestrator::Pipeline;
use crate::result::RunSummary;

pub const STATUS_OK: u16 = 200;
pub const STATUS_INTERNAL_ERROR: u16 = 500;
pub const STATUS_BAD_GATEWAY: u16 = 502;

/// Terminal status returned to the invoker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationStatus {
    pub code: u16,
    pub message: String,
}

impl InvocationStatus {
    pub fn is_success(&self) -> bool {
        self.code == STATUS_OK
    }
}

impl From<&RunSummary> for InvocationStatus {
    fn from(summary: &RunSummary) -> Self {
        Self {
            code: STATUS_OK,
            message: summary.headline(),
        }
    }
}

impl From<&StageFailure> for InvocationStatus {
    fn from(failure: &StageFailure) -> Self {
        let code = match failure.stage {
            Stage::Fetch => STATUS_BAD_GATEWAY,
            _ => STATUS_INTERNAL_ERROR,
        };
        Self {
            code,
            message: failure.to_string(),
        }
    }
}

/// Binds a pipeline to one dataset and its source.
#[derive(Clone)]
pub struct Handler {
    pipeline: Arc<Pipeline>,
    request: FetchRequest,
    descriptor: DatasetDescriptor,
}

impl Handler {
    pub fn new(pipeline: Arc<Pipeline>, request: FetchRequest, descriptor: DatasetDescriptor) -> Self {
        Self {
            pipeline,
            request,
            descriptor,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    pub fn descriptor(&self) -> &DatasetDescriptor {
        &self.descriptor
    }

    /// Run the pipeline once. The event is opaque and only logged.
    ///
    /// Every failure, including a panic inside the run, becomes a status.
    /// Dropping the returned future aborts the run; an open load
    /// transaction is then discarded, never committed.
    pub async fn handle(&self, event: &Value) -> InvocationStatus {
        tracing::debug!(dataset = %self.descriptor.name, %event, "Invocation received");

        let pipeline = Arc::clone(&self.pipeline);
        let request = self.request.clone();
        let descriptor = self.descriptor.clone();
        let run = AbortOnDropHandle::new(tokio::spawn(async move {
            pipeline.run(&request, &descriptor).await
        }));

        match run.await {
            Ok(Ok(summary)) => InvocationStatus::from(&summary),
            Ok(Err(failure)) => InvocationStatus::from(&failure),
            Err(e) => {
                tracing::error!(dataset = %self.descriptor.name, error = %e, "Pipeline task aborted");
                InvocationStatus {
                    code: STATUS_INTERNAL_ERROR,
                    message: format!("pipeline task aborted: {e}"),
                }
            }
        }
    }
}
