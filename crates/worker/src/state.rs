use std::sync::Arc;

use scail_comfyui::api::{ComfyUIApi, ComfyUIApiError};
use scail_comfyui::client::ComfyUIClient;
use scail_comfyui::executor::ExecutionClient;
use scail_comfyui::poll::HistoryPollConfig;
use scail_pipeline::{InputResolver, JobRunner};
use scail_storage::{Publisher, R2Store};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Executes jobs end to end.
    pub runner: Arc<JobRunner>,
    /// Held for the duration of a job; the engine runs one job at a time.
    pub job_lock: Arc<Mutex<()>>,
    /// Cancelled when the worker begins shutting down.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(runner: JobRunner, shutdown: CancellationToken) -> Self {
        Self {
            runner: Arc::new(runner),
            job_lock: Arc::new(Mutex::new(())),
            shutdown,
        }
    }

    /// Wire the ComfyUI executor, the R2 publisher and the input stager
    /// from configuration.
    pub fn from_config(
        config: &WorkerConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, ComfyUIApiError> {
        let executor = ExecutionClient::new(
            ComfyUIApi::new(config.comfyui_url.clone(), config.request_timeout)?,
            ComfyUIClient::new(config.comfyui_ws_url.clone(), config.client_id.clone()),
            config.execution_timeout,
        )
        .with_poll_config(HistoryPollConfig {
            attempts: config.history_poll_attempts,
            ..Default::default()
        });

        let store = R2Store::new(&config.r2);
        let publisher = Publisher::new(Arc::new(store), config.r2.public_url.clone());

        let runner = JobRunner::new(
            InputResolver::new(config.input_dir.clone()),
            Arc::new(executor),
            publisher,
        );

        Ok(Self::new(runner, shutdown))
    }
}
