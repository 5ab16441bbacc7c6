//! Drives one workflow through ComfyUI: submit, await completion,
//! resolve the output node's artifacts.
//!
//! Each call to [`ExecutionClient::execute`] opens its own event-stream
//! connection and closes it on every exit path. The wait is bounded by
//! the configured completion timeout and by the caller's
//! [`CancellationToken`]; connecting and submitting stop on cancellation
//! too. Every REST call carries the API client's request timeout.

use std::time::Duration;

use scail_core::graph::WorkflowGraph;
use scail_core::job::OutputDescriptor;
use tokio_util::sync::CancellationToken;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::client::{ComfyUIClient, ComfyUIClientError, WsStream};
use crate::history::{lookup_outputs, HistoryLookup};
use crate::poll::{next_delay, HistoryPollConfig};
use crate::processor::{wait_for_completion, Completion};

/// Submits workflows and collects their outputs.
pub struct ExecutionClient {
    api: ComfyUIApi,
    client: ComfyUIClient,
    poll: HistoryPollConfig,
    completion_timeout: Duration,
}

impl ExecutionClient {
    pub fn new(api: ComfyUIApi, client: ComfyUIClient, completion_timeout: Duration) -> Self {
        Self {
            api,
            client,
            poll: HistoryPollConfig::default(),
            completion_timeout,
        }
    }

    pub fn with_poll_config(mut self, poll: HistoryPollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Run `workflow` and return the descriptors produced by `output_node`.
    ///
    /// The event stream is opened before submission so that a prompt
    /// served entirely from cache cannot finish unobserved.
    pub async fn execute(
        &self,
        workflow: &WorkflowGraph,
        output_node: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<OutputDescriptor>, ExecutionError> {
        let conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
            conn = self.client.connect() => conn?,
        };
        let mut ws = conn.ws_stream;

        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
            result = self.submit(workflow) => result,
        };
        let prompt_id = match submitted {
            Ok(id) => id,
            Err(e) => {
                close_stream(&mut ws).await;
                return Err(e);
            }
        };

        tracing::info!(
            prompt_id = %prompt_id,
            output_node,
            client_id = %conn.client_id,
            "Workflow submitted to ComfyUI",
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
            result = tokio::time::timeout(
                self.completion_timeout,
                self.await_outputs(&mut ws, &prompt_id, output_node),
            ) => result.unwrap_or(Err(ExecutionError::Timeout(self.completion_timeout))),
        };

        close_stream(&mut ws).await;

        if matches!(
            outcome,
            Err(ExecutionError::Cancelled | ExecutionError::Timeout(_))
        ) {
            self.abandon(&prompt_id).await;
        }

        outcome
    }

    /// Download the bytes of one output file.
    pub async fn fetch_output(&self, output: &OutputDescriptor) -> Result<Vec<u8>, ExecutionError> {
        Ok(self.api.get_view(output).await?)
    }

    // ---- private helpers ----

    async fn submit(&self, workflow: &WorkflowGraph) -> Result<String, ExecutionError> {
        let response = self
            .api
            .submit_workflow(workflow, self.client.client_id())
            .await
            .map_err(|e| ExecutionError::Submission(e.to_string()))?;

        response
            .prompt_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ExecutionError::Submission(format!(
                    "ComfyUI returned no prompt_id (node_errors: {})",
                    response.node_errors
                ))
            })
    }

    /// Wait for completion events until the output node's artifacts can
    /// be read from history.
    async fn await_outputs(
        &self,
        ws: &mut WsStream,
        prompt_id: &str,
        output_node: &str,
    ) -> Result<Vec<OutputDescriptor>, ExecutionError> {
        loop {
            let completion = wait_for_completion(ws, prompt_id).await?;
            if let Completion::NodeExecuted { node } = &completion {
                if !node.is_empty() && node != output_node {
                    continue;
                }
            }

            match self.poll_history(prompt_id, output_node).await? {
                HistoryLookup::Ready(outputs) => {
                    tracing::info!(prompt_id, count = outputs.len(), "Execution outputs resolved");
                    return Ok(outputs);
                }
                HistoryLookup::Empty => {
                    return Err(ExecutionError::NoOutput {
                        node_id: output_node.to_string(),
                    });
                }
                // No further events follow the end of a prompt.
                HistoryLookup::Pending if completion == Completion::PromptFinished => {
                    tracing::warn!(prompt_id, output_node, "Prompt finished without recorded output");
                    return Err(ExecutionError::NoOutput {
                        node_id: output_node.to_string(),
                    });
                }
                HistoryLookup::Pending => {
                    tracing::warn!(
                        prompt_id,
                        output_node,
                        "History not available after completion event, waiting for more events",
                    );
                }
            }
        }
    }

    /// Read history until the output node is recorded or the poll
    /// budget runs out.
    async fn poll_history(
        &self,
        prompt_id: &str,
        output_node: &str,
    ) -> Result<HistoryLookup, ExecutionError> {
        let attempts = self.poll.attempts.max(1);
        let mut delay = self.poll.initial_delay;

        for attempt in 1..=attempts {
            let history = self.api.get_history(prompt_id).await?;
            match lookup_outputs(&history, prompt_id, output_node) {
                HistoryLookup::Pending if attempt < attempts => {
                    tracing::debug!(prompt_id, attempt, delay_ms = delay.as_millis() as u64, "History pending");
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, &self.poll);
                }
                lookup => return Ok(lookup),
            }
        }

        Ok(HistoryLookup::Pending)
    }

    /// Best-effort removal of a prompt the worker stopped waiting for.
    ///
    /// The engine is dedicated to this worker, so interrupting the
    /// running execution only affects the abandoned prompt.
    async fn abandon(&self, prompt_id: &str) {
        if let Err(e) = self.api.cancel_execution(prompt_id).await {
            tracing::warn!(prompt_id, error = %e, "Failed to remove prompt from queue");
        }
        if let Err(e) = self.api.interrupt().await {
            tracing::warn!(prompt_id, error = %e, "Failed to interrupt execution");
        }
    }
}

async fn close_stream(ws: &mut WsStream) {
    if let Err(e) = ws.close(None).await {
        tracing::debug!(error = %e, "Error closing ComfyUI WebSocket");
    }
}

/// Errors from a single workflow execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The event stream could not be opened.
    #[error(transparent)]
    Connection(#[from] ComfyUIClientError),

    /// ComfyUI rejected the workflow or returned no prompt id.
    #[error("Submission rejected: {0}")]
    Submission(String),

    /// A history or output request failed.
    #[error(transparent)]
    Api(#[from] ComfyUIApiError),

    #[error("Event stream closed before the execution completed")]
    StreamClosed,

    #[error("Event stream error: {0}")]
    Protocol(String),

    /// ComfyUI reported an `execution_error` for the prompt.
    #[error("Execution failed at node {node_id} ({exception_type}): {message}")]
    EngineFailed {
        node_id: String,
        exception_type: String,
        message: String,
    },

    #[error("Execution was interrupted")]
    Interrupted,

    /// The prompt finished without artifacts on the output node.
    #[error("Output node {node_id} produced no output")]
    NoOutput { node_id: String },

    #[error("No completion event within {0:?}")]
    Timeout(Duration),

    #[error("Execution cancelled")]
    Cancelled,
}
