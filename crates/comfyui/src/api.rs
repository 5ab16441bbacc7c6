//! REST client for the ComfyUI HTTP endpoints the bridge uses.
//!
//! | Call                    | Endpoint                     |
//! |-------------------------|------------------------------|
//! | [`ComfyUIApi::submit_workflow`]  | `POST /prompt`      |
//! | [`ComfyUIApi::get_history`]      | `GET /history/{id}` |
//! | [`ComfyUIApi::get_view`]         | `GET /view`         |
//! | [`ComfyUIApi::cancel_execution`] | `POST /queue`       |
//! | [`ComfyUIApi::interrupt`]        | `POST /interrupt`   |

use std::time::Duration;

use reqwest::Response;
use scail_core::graph::WorkflowGraph;
use scail_core::job::OutputDescriptor;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::history::History;

/// HTTP client for a single ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Body of a `/prompt` reply.
///
/// `prompt_id` is optional so that a 2xx reply without one surfaces as
/// a submission failure rather than a decode error.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub prompt_id: Option<String>,
    /// Queue position.
    #[serde(default)]
    pub number: Option<i64>,
    #[serde(default)]
    pub node_errors: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// Network, DNS, TLS or body decode failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI answered with a non-2xx status.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

/// Per-request limit applied when the worker configures none.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

impl ComfyUIApi {
    /// * `api_url`         - Base HTTP URL, e.g. `http://host:8188`.
    /// * `request_timeout` - Upper bound on each request, body included.
    pub fn new(api_url: String, request_timeout: Duration) -> Result<Self, ComfyUIApiError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Queue `workflow` under `client_id`. Events for the resulting
    /// prompt are delivered to the event stream opened with the same id.
    pub async fn submit_workflow(
        &self,
        workflow: &WorkflowGraph,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let response = self
            .client
            .post(self.url("/prompt"))
            .json(&json!({ "prompt": workflow, "client_id": client_id }))
            .send()
            .await?;

        decode(response).await
    }

    /// Execution history for one prompt. Empty until the engine has
    /// recorded the prompt.
    pub async fn get_history(&self, prompt_id: &str) -> Result<History, ComfyUIApiError> {
        let response = self
            .client
            .get(self.url(&format!("/history/{prompt_id}")))
            .send()
            .await?;

        decode(response).await
    }

    /// Raw bytes of one output file, fully buffered.
    pub async fn get_view(&self, output: &OutputDescriptor) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(self.url("/view"))
            .query(&[
                ("filename", output.filename.as_str()),
                ("subfolder", output.subfolder.as_str()),
                ("type", output.folder_type.as_str()),
            ])
            .send()
            .await?;

        let bytes = ensure_success(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// Drop `prompt_id` from the pending queue.
    pub async fn cancel_execution(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .post(self.url("/queue"))
            .json(&json!({ "delete": [prompt_id] }))
            .send()
            .await?;

        ensure_success(response).await.map(drop)
    }

    /// Stop whatever is executing right now, regardless of prompt.
    pub async fn interrupt(&self) -> Result<(), ComfyUIApiError> {
        let response = self.client.post(self.url("/interrupt")).send().await?;
        ensure_success(response).await.map(drop)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }
}

/// Pass 2xx responses through; turn anything else into
/// [`ComfyUIApiError::ApiError`] carrying the body text.
async fn ensure_success(response: Response) -> Result<Response, ComfyUIApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(ComfyUIApiError::ApiError {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ComfyUIApiError> {
    Ok(ensure_success(response).await?.json::<T>().await?)
}
