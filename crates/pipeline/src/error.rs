use scail_comfyui::executor::ExecutionError;
use scail_core::error::CoreError;
use scail_core::graph::{SAVE_IMAGE_CLASS, VIDEO_COMBINE_CLASS};
use scail_storage::StorageError;

use crate::downloader::DownloadError;

/// Every way a job can fail.
///
/// Converted to a string only when it becomes a
/// [`JobResult::Error`](scail_core::job::JobResult::Error).
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Missing or malformed job input.
    #[error("Input error: {0}")]
    InputValidation(String),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(
        "Workflow must contain a '{}' or '{}' node for output.",
        VIDEO_COMBINE_CLASS,
        SAVE_IMAGE_CLASS
    )]
    NoOutputNode,

    /// The engine rejected the workflow or assigned no prompt id.
    #[error("Failed to queue workflow: {0}")]
    Submission(String),

    /// The wait ended without usable output (deadline, cancellation,
    /// closed stream, or an output node that produced nothing).
    #[error("Execution timeout or workflow produced no output: {0}")]
    ExecutionTimeoutOrEmpty(String),

    /// The engine reported a failed or interrupted execution.
    #[error("Workflow execution failed: {0}")]
    Execution(String),

    #[error("Failed to fetch output '{filename}': {message}")]
    OutputFetch { filename: String, message: String },

    #[error("Failed to publish output: {0}")]
    Publish(#[from] StorageError),
}

impl From<CoreError> for JobError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::InputValidation(msg),
            CoreError::NoOutputNode => Self::NoOutputNode,
        }
    }
}

impl From<ExecutionError> for JobError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Connection(_) | ExecutionError::Submission(_) => {
                Self::Submission(err.to_string())
            }
            ExecutionError::EngineFailed { .. }
            | ExecutionError::Interrupted
            | ExecutionError::Api(_) => Self::Execution(err.to_string()),
            ExecutionError::StreamClosed
            | ExecutionError::Protocol(_)
            | ExecutionError::NoOutput { .. }
            | ExecutionError::Timeout(_)
            | ExecutionError::Cancelled => Self::ExecutionTimeoutOrEmpty(err.to_string()),
        }
    }
}
