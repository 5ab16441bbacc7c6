//! Sequences one job from payload to published URLs.

use std::sync::Arc;

use scail_core::graph::{
    WorkflowGraph, IMAGE_INPUT_FIELD, LOAD_IMAGE_CLASS, LOAD_VIDEO_CLASS, VIDEO_INPUT_FIELD,
};
use scail_core::job::{ArtifactBundle, JobRequest, JobResult};
use scail_storage::content_type::content_type_for;
use scail_storage::Publisher;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::downloader::{InputResolver, MediaKind};
use crate::engine::ExecutionEngine;
use crate::error::JobError;

/// Runs jobs end to end against one engine and one object store.
#[derive(Clone)]
pub struct JobRunner {
    resolver: InputResolver,
    engine: Arc<dyn ExecutionEngine>,
    publisher: Publisher,
}

impl JobRunner {
    pub fn new(resolver: InputResolver, engine: Arc<dyn ExecutionEngine>, publisher: Publisher) -> Self {
        Self {
            resolver,
            engine,
            publisher,
        }
    }

    /// Run the job described by `input` and report its terminal result.
    ///
    /// Never fails: every [`JobError`] becomes a [`JobResult::Error`].
    pub async fn handle(&self, input: &Value, cancel: &CancellationToken) -> JobResult {
        match self.run(input, cancel).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Job failed");
                JobResult::error(e.to_string())
            }
        }
    }

    /// Run the job, propagating the first failure.
    pub async fn run(&self, input: &Value, cancel: &CancellationToken) -> Result<JobResult, JobError> {
        let JobRequest {
            mut workflow,
            video_url,
            image_url,
            images,
            skipped_images,
        } = JobRequest::from_input(input)?;

        if skipped_images > 0 {
            tracing::warn!(skipped = skipped_images, "Ignoring malformed 'images' entries");
        }

        if let Some(url) = video_url {
            let filename = self.resolver.resolve(&url, MediaKind::Video, None).await?;
            inject_media(&mut workflow, LOAD_VIDEO_CLASS, VIDEO_INPUT_FIELD, filename);
        }

        if let Some(url) = image_url {
            let filename = self.resolver.resolve(&url, MediaKind::Image, None).await?;
            inject_media(&mut workflow, LOAD_IMAGE_CLASS, IMAGE_INPUT_FIELD, filename);
        }

        for slot in &images {
            if !workflow.contains_node(&slot.node_id) {
                tracing::warn!(node_id = %slot.node_id, "Image target node not in workflow, skipping");
                continue;
            }
            let filename = self.resolver.resolve(&slot.url, MediaKind::Image, None).await?;
            workflow.inject(LOAD_IMAGE_CLASS, IMAGE_INPUT_FIELD, filename, Some(slot.node_id.as_str()));
            tracing::debug!(node_id = %slot.node_id, "Injected per-node image");
        }

        let target = workflow.locate_output()?;
        tracing::info!(
            node_id = %target.node_id,
            family = %target.family,
            nodes = workflow.len(),
            "Executing workflow",
        );

        let outputs = self.engine.execute(&workflow, &target.node_id, cancel).await?;
        let bundle = ArtifactBundle {
            family: target.family,
            outputs,
        };

        let urls = self.publish_bundle(&bundle).await?;
        tracing::info!(family = %bundle.family, count = urls.len(), "Job complete");
        Ok(JobResult::success(bundle.family, urls))
    }

    /// Fetch and upload every artifact in order. The first failure aborts
    /// the job and no URLs are reported.
    async fn publish_bundle(&self, bundle: &ArtifactBundle) -> Result<Vec<String>, JobError> {
        let mut urls = Vec::with_capacity(bundle.outputs.len());

        for output in &bundle.outputs {
            if output.filename.is_empty() {
                tracing::warn!("Skipping output without a filename");
                continue;
            }

            let bytes = self
                .engine
                .fetch_output(output)
                .await
                .map_err(|e| JobError::OutputFetch {
                    filename: output.filename.clone(),
                    message: e.to_string(),
                })?;

            let url = self
                .publisher
                .publish(bytes, &output.filename, content_type_for(&output.filename))
                .await?;
            urls.push(url);
        }

        Ok(urls)
    }
}

/// Inject into every node of `class_type`; no match is only a warning.
fn inject_media(workflow: &mut WorkflowGraph, class_type: &str, field: &str, filename: String) {
    let modified = workflow.inject(class_type, field, filename, None);
    if modified.is_empty() {
        tracing::warn!(class_type, "Media provided but workflow has no matching node");
    } else {
        tracing::debug!(class_type, nodes = ?modified, "Injected media filename");
    }
}
