//! Per-job orchestration for the ComfyUI worker.
//!
//! A job flows strictly forward: stage media inputs, inject them into the
//! workflow, locate the output node, execute, then publish each artifact.
//! [`runner::JobRunner`] sequences those steps and folds every failure
//! into a [`JobResult`](scail_core::job::JobResult) error.

pub mod downloader;
pub mod engine;
pub mod error;
pub mod runner;

pub use downloader::{InputResolver, MediaKind};
pub use engine::ExecutionEngine;
pub use error::JobError;
pub use runner::JobRunner;
