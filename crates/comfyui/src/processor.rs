//! Completion wait loop over a ComfyUI event stream.
//!
//! Reads raw frames, parses them into typed [`ComfyUIMessage`]
//! variants and returns as soon as one signals completion for the
//! awaited prompt. Frames for other prompts, binary previews and
//! unparseable text are skipped without buffering.

use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::executor::ExecutionError;
use crate::messages::{parse_message, ComfyUIMessage};

/// Why the wait loop returned successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// An `executed` event for the prompt. `node` is empty when the
    /// event did not name the node.
    NodeExecuted { node: String },
    /// The whole prompt finished (`executing` with a null node, or
    /// `execution_success`).
    PromptFinished,
}

/// Wait until the stream reports completion for `prompt_id`.
///
/// Fails when the engine reports an error or interruption for the
/// prompt, or when the stream ends first.
pub async fn wait_for_completion<S>(
    stream: &mut S,
    prompt_id: &str,
) -> Result<Completion, ExecutionError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if let Some(outcome) = handle_text_message(&text, prompt_id) {
                    return outcome;
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::trace!(prompt_id, "Ignoring binary message (preview image)");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                // Handled automatically by tungstenite.
            }
            Ok(Message::Close(frame)) => {
                tracing::info!(prompt_id, ?frame, "ComfyUI WebSocket closed");
                return Err(ExecutionError::StreamClosed);
            }
            Ok(Message::Frame(_)) => {}
            Err(e) => {
                tracing::error!(prompt_id, error = %e, "WebSocket receive error");
                return Err(ExecutionError::Protocol(e.to_string()));
            }
        }
    }

    Err(ExecutionError::StreamClosed)
}

/// Interpret one text frame. `None` means keep waiting.
fn handle_text_message(
    text: &str,
    prompt_id: &str,
) -> Option<Result<Completion, ExecutionError>> {
    let msg = match parse_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::trace!(error = %e, raw_message = %text, "Skipping unrecognised ComfyUI message");
            return None;
        }
    };

    if let ComfyUIMessage::Status(data) = &msg {
        tracing::debug!(queue_remaining = ?data.queue_remaining(), "ComfyUI queue status");
        return None;
    }

    if msg.prompt_id() != Some(prompt_id) {
        return None;
    }

    match msg {
        ComfyUIMessage::Executed(event) => {
            let node = event.node.unwrap_or_default();
            tracing::debug!(prompt_id, node = %node, "Node executed with output");
            Some(Ok(Completion::NodeExecuted { node }))
        }
        ComfyUIMessage::Executing(event) if event.node.is_none() => {
            tracing::info!(prompt_id, "Execution completed (all nodes done)");
            Some(Ok(Completion::PromptFinished))
        }
        ComfyUIMessage::ExecutionSuccess(_) => Some(Ok(Completion::PromptFinished)),
        ComfyUIMessage::ExecutionError(data) => {
            tracing::error!(
                prompt_id,
                node_id = %data.node_id,
                error_type = %data.exception_type,
                error_message = %data.exception_message,
                "Execution error",
            );
            Some(Err(ExecutionError::EngineFailed {
                node_id: data.node_id,
                exception_type: data.exception_type,
                message: data.exception_message,
            }))
        }
        ComfyUIMessage::ExecutionInterrupted(_) => {
            tracing::warn!(prompt_id, "Execution interrupted");
            Some(Err(ExecutionError::Interrupted))
        }
        ComfyUIMessage::Progress(data) => {
            tracing::debug!(prompt_id, value = data.value, max = data.max, "Generation progress");
            None
        }
        ComfyUIMessage::Executing(event) => {
            tracing::debug!(prompt_id, node = ?event.node, "Executing node");
            None
        }
        ComfyUIMessage::Status(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use futures::stream;

    use super::*;

    fn text(s: &str) -> Result<Message, WsError> {
        Ok(Message::Text(s.to_string()))
    }

    #[tokio::test]
    async fn mismatched_prompt_keeps_waiting() {
        let mut frames = stream::iter(vec![
            text(r#"{"type":"executed","data":{"prompt_id":"other","node":"9"}}"#),
            text(r#"{"type":"executing","data":{"node":null,"prompt_id":"other"}}"#),
            text(r#"{"type":"executed","data":{"prompt_id":"mine","node":"9"}}"#),
        ]);
        let done = wait_for_completion(&mut frames, "mine").await.unwrap();
        assert_eq!(done, Completion::NodeExecuted { node: "9".into() });
    }

    #[tokio::test]
    async fn mismatched_prompt_only_never_completes() {
        let mut frames = stream::iter(vec![text(
            r#"{"type":"executed","data":{"prompt_id":"other"}}"#,
        )]);
        assert_matches!(
            wait_for_completion(&mut frames, "mine").await,
            Err(ExecutionError::StreamClosed)
        );
    }

    #[tokio::test]
    async fn non_text_and_unknown_frames_are_ignored() {
        let mut frames = stream::iter(vec![
            Ok(Message::Binary(vec![1, 2, 3])),
            Ok(Message::Ping(vec![])),
            text("garbage"),
            text(r#"{"type":"crystools.monitor","data":{"cpu":3}}"#),
            text(r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":1}}}}"#),
            text(r#"{"type":"execution_success","data":{"prompt_id":"mine"}}"#),
        ]);
        assert_eq!(
            wait_for_completion(&mut frames, "mine").await.unwrap(),
            Completion::PromptFinished
        );
    }

    #[tokio::test]
    async fn executing_null_node_finishes_prompt() {
        let mut frames = stream::iter(vec![
            text(r#"{"type":"executing","data":{"node":"3","prompt_id":"mine"}}"#),
            text(r#"{"type":"executing","data":{"node":null,"prompt_id":"mine"}}"#),
        ]);
        assert_eq!(
            wait_for_completion(&mut frames, "mine").await.unwrap(),
            Completion::PromptFinished
        );
    }

    #[tokio::test]
    async fn execution_error_fails_fast() {
        let mut frames = stream::iter(vec![
            text(r#"{"type":"execution_error","data":{"prompt_id":"mine","node_id":"5","exception_message":"oom","exception_type":"RuntimeError"}}"#),
            text(r#"{"type":"executed","data":{"prompt_id":"mine"}}"#),
        ]);
        assert_matches!(
            wait_for_completion(&mut frames, "mine").await,
            Err(ExecutionError::EngineFailed { node_id, .. }) if node_id == "5"
        );
    }

    #[tokio::test]
    async fn close_frame_ends_wait() {
        let mut frames = stream::iter(vec![Ok(Message::Close(None))]);
        assert_matches!(
            wait_for_completion(&mut frames, "mine").await,
            Err(ExecutionError::StreamClosed)
        );
    }
}
