//! Typed view of the ComfyUI event stream.
//!
//! Every text frame is `{"type": "<kind>", "data": {...}}`. Only the
//! kinds that drive a prompt's lifecycle are modelled; anything else
//! fails to parse and is skipped by the wait loop.

use serde::Deserialize;
use serde_json::Value;

/// Lifecycle events for prompts queued on the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ComfyUIMessage {
    /// Queue broadcast, not tied to a prompt.
    Status(StatusData),
    /// `node` is `None` once the whole prompt has run.
    Executing(NodeEvent),
    Progress(ProgressData),
    /// A node finished and produced output.
    Executed(NodeEvent),
    ExecutionSuccess(PromptRef),
    ExecutionInterrupted(PromptRef),
    ExecutionError(ErrorData),
}

impl ComfyUIMessage {
    /// The prompt this message refers to, when it carries one.
    pub fn prompt_id(&self) -> Option<&str> {
        let id = match self {
            Self::Status(_) => return None,
            Self::Executing(event) | Self::Executed(event) => &event.prompt_id,
            Self::Progress(data) => &data.prompt_id,
            Self::ExecutionSuccess(prompt) | Self::ExecutionInterrupted(prompt) => &prompt.prompt_id,
            Self::ExecutionError(data) => &data.prompt_id,
        };
        Some(id.as_str()).filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    #[serde(default)]
    pub status: Value,
}

impl StatusData {
    /// Prompts still waiting in the engine queue, when reported.
    pub fn queue_remaining(&self) -> Option<i64> {
        self.status
            .pointer("/exec_info/queue_remaining")
            .and_then(Value::as_i64)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptRef {
    #[serde(default)]
    pub prompt_id: String,
}

/// Payload shared by `executing` and `executed`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeEvent {
    #[serde(default)]
    pub prompt_id: String,
    /// Node id; ComfyUI sends `null` on the final `executing` event.
    #[serde(default)]
    pub node: Option<String>,
    /// Raw node output on `executed` (`images`, `gifs`, ...).
    #[serde(default)]
    pub output: Value,
}

/// Step-level progress within a node (sampler steps and the like).
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    pub value: u64,
    pub max: u64,
    #[serde(default)]
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub exception_type: String,
    #[serde(default)]
    pub exception_message: String,
}

/// Parse one text frame. Unknown `type` values are an error.
pub fn parse_message(text: &str) -> Result<ComfyUIMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn status_exposes_queue_depth() {
        let msg = parse_message(
            r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":3}},"sid":"s"}}"#,
        )
        .unwrap();
        assert_eq!(msg.prompt_id(), None);
        let data = assert_matches!(msg, ComfyUIMessage::Status(data) => data);
        assert_eq!(data.queue_remaining(), Some(3));
    }

    #[test]
    fn final_executing_event_has_no_node() {
        let msg = parse_message(r#"{"type":"executing","data":{"node":null,"prompt_id":"xyz"}}"#).unwrap();
        assert_eq!(msg.prompt_id(), Some("xyz"));
        assert_matches!(msg, ComfyUIMessage::Executing(NodeEvent { node: None, .. }));
    }

    #[test]
    fn executed_carries_node_and_output() {
        let msg = parse_message(
            r#"{"type":"executed","data":{"node":"9","output":{"images":[{"filename":"out.png"}]},"prompt_id":"abc"}}"#,
        )
        .unwrap();
        let event = assert_matches!(msg, ComfyUIMessage::Executed(event) => event);
        assert_eq!(event.node.as_deref(), Some("9"));
        assert!(event.output["images"].is_array());
    }

    #[test]
    fn executed_with_only_prompt_id_parses() {
        let msg = parse_message(r#"{"type":"executed","data":{"prompt_id":"abc"}}"#).unwrap();
        assert_eq!(msg.prompt_id(), Some("abc"));
        assert_matches!(msg, ComfyUIMessage::Executed(NodeEvent { node: None, .. }));
    }

    #[test]
    fn missing_prompt_id_is_none() {
        let msg = parse_message(r#"{"type":"progress","data":{"value":5,"max":20}}"#).unwrap();
        assert_eq!(msg.prompt_id(), None);
    }

    #[test]
    fn terminal_events_parse() {
        let msg = parse_message(r#"{"type":"execution_success","data":{"prompt_id":"p","timestamp":1}}"#)
            .unwrap();
        assert_matches!(msg, ComfyUIMessage::ExecutionSuccess(PromptRef { ref prompt_id }) if prompt_id == "p");

        let msg = parse_message(
            r#"{"type":"execution_interrupted","data":{"prompt_id":"p","node_id":"3","executed":[]}}"#,
        )
        .unwrap();
        assert_matches!(msg, ComfyUIMessage::ExecutionInterrupted(_));

        let msg = parse_message(
            r#"{"type":"execution_error","data":{"prompt_id":"abc","node_id":"5","exception_message":"out of memory","exception_type":"RuntimeError","traceback":[]}}"#,
        )
        .unwrap();
        let data = assert_matches!(msg, ComfyUIMessage::ExecutionError(data) => data);
        assert_eq!(data.node_id, "5");
        assert_eq!(data.exception_type, "RuntimeError");
        assert_eq!(data.exception_message, "out of memory");
    }

    #[test]
    fn unmodelled_or_malformed_frames_fail() {
        assert!(parse_message(r#"{"type":"execution_cached","data":{"nodes":[],"prompt_id":"p"}}"#).is_err());
        assert!(parse_message(r#"{"type":"crystools.monitor","data":{}}"#).is_err());
        assert!(parse_message("not json at all").is_err());
    }
}
