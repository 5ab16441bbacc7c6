use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use scail_comfyui::executor::ExecutionError;
use scail_core::graph::WorkflowGraph;
use scail_core::job::OutputDescriptor;
use scail_pipeline::{ExecutionEngine, InputResolver, JobRunner};
use scail_storage::{ObjectStore, Publisher, StorageResult};
use scail_worker::router::build_app_router;
use scail_worker::state::AppState;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub const PUBLIC_BASE: &str = "https://cdn.example.com";

/// Engine that reports the same outputs for every workflow and counts
/// executions.
pub struct FixedEngine {
    pub outputs: Vec<OutputDescriptor>,
    pub executions: Mutex<usize>,
}

#[async_trait]
impl ExecutionEngine for FixedEngine {
    async fn execute(
        &self,
        _workflow: &WorkflowGraph,
        _output_node: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<OutputDescriptor>, ExecutionError> {
        *self.executions.lock().unwrap() += 1;
        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }
        Ok(self.outputs.clone())
    }

    async fn fetch_output(&self, output: &OutputDescriptor) -> Result<Vec<u8>, ExecutionError> {
        Ok(output.filename.as_bytes().to_vec())
    }
}

pub struct NullStore;

#[async_trait]
impl ObjectStore for NullStore {
    async fn put_object(&self, _key: &str, _body: Vec<u8>, _content_type: &str) -> StorageResult<()> {
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub engine: Arc<FixedEngine>,
    pub shutdown: CancellationToken,
    _staging: tempfile::TempDir,
}

/// Build the full application router around a fixed engine that
/// produces `filenames`.
pub fn build_test_app(filenames: &[&str]) -> TestApp {
    let staging = tempfile::tempdir().unwrap();
    let engine = Arc::new(FixedEngine {
        outputs: filenames
            .iter()
            .map(|f| OutputDescriptor {
                filename: f.to_string(),
                subfolder: String::new(),
                folder_type: "output".into(),
            })
            .collect(),
        executions: Mutex::new(0),
    });
    let runner = JobRunner::new(
        InputResolver::new(staging.path()),
        engine.clone(),
        Publisher::new(Arc::new(NullStore), PUBLIC_BASE),
    );
    let shutdown = CancellationToken::new();
    let router = build_app_router(AppState::new(runner, shutdown.clone()));

    TestApp {
        router,
        engine,
        shutdown,
        _staging: staging,
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_raw(app: Router, uri: &str, body: impl Into<Body>) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: &Value) -> Response<Body> {
    post_raw(app, uri, body.to_string()).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
