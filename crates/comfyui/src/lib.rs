//! ComfyUI WebSocket and REST client library.
//!
//! Provides typed message parsing, the per-job event-stream connection,
//! HTTP API wrappers, history output extraction, and the
//! [`ExecutionClient`](executor::ExecutionClient) that drives one
//! workflow from submission to its output descriptors.

pub mod api;
pub mod client;
pub mod executor;
pub mod history;
pub mod messages;
pub mod poll;
pub mod processor;
