//! The execution seam between the job runner and ComfyUI.

use async_trait::async_trait;
use scail_comfyui::executor::{ExecutionClient, ExecutionError};
use scail_core::graph::WorkflowGraph;
use scail_core::job::OutputDescriptor;
use tokio_util::sync::CancellationToken;

/// Runs workflows and serves their output bytes.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Execute `workflow` and return the artifacts of `output_node`.
    async fn execute(
        &self,
        workflow: &WorkflowGraph,
        output_node: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<OutputDescriptor>, ExecutionError>;

    /// Fetch the raw bytes of one artifact.
    async fn fetch_output(&self, output: &OutputDescriptor) -> Result<Vec<u8>, ExecutionError>;
}

#[async_trait]
impl ExecutionEngine for ExecutionClient {
    async fn execute(
        &self,
        workflow: &WorkflowGraph,
        output_node: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<OutputDescriptor>, ExecutionError> {
        ExecutionClient::execute(self, workflow, output_node, cancel).await
    }

    async fn fetch_output(&self, output: &OutputDescriptor) -> Result<Vec<u8>, ExecutionError> {
        ExecutionClient::fetch_output(self, output).await
    }
}
