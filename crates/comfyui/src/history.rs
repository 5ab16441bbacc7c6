//! Execution history records and output extraction.
//!
//! `GET /history/{prompt_id}` returns `{prompt_id: {outputs, status}}`
//! where `outputs` maps node id to whatever the node reported. Sink
//! nodes report the same artifact under different keys (`images` for
//! `SaveImage`, `gifs` for `VHS_VideoCombine`, ...), so extraction
//! takes the first non-empty list in [`OUTPUT_KEYS`] order.

use std::collections::HashMap;

use scail_core::job::OutputDescriptor;
use serde::Deserialize;

/// History keyed by prompt id.
pub type History = HashMap<String, HistoryEntry>;

/// Output list keys, highest priority first.
pub const OUTPUT_KEYS: [&str; 4] = ["images", "gifs", "audio", "filenames"];

/// One prompt's history record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    /// Node id to the raw output object of that node.
    #[serde(default)]
    pub outputs: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub status: Option<HistoryStatus>,
}

/// Completion status of a recorded prompt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

/// Result of looking up one node's outputs in a history response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryLookup {
    /// The node produced these artifacts.
    Ready(Vec<OutputDescriptor>),
    /// The prompt (or the node's entry) is not recorded yet.
    Pending,
    /// The prompt finished but the node reported nothing usable.
    Empty,
}

/// Extract descriptors from a node's raw output object.
///
/// Uses the first key of [`OUTPUT_KEYS`] holding a non-empty list.
/// Entries that are neither descriptor objects nor bare filenames are
/// dropped.
pub fn extract_outputs(node_output: &serde_json::Value) -> Vec<OutputDescriptor> {
    OUTPUT_KEYS
        .iter()
        .filter_map(|key| node_output.get(key)?.as_array())
        .find(|list| !list.is_empty())
        .map(|list| list.iter().filter_map(OutputDescriptor::from_value).collect())
        .unwrap_or_default()
}

/// Find the outputs of `node_id` for `prompt_id`.
pub fn lookup_outputs(history: &History, prompt_id: &str, node_id: &str) -> HistoryLookup {
    let Some(entry) = history.get(prompt_id) else {
        return HistoryLookup::Pending;
    };

    let outputs = entry
        .outputs
        .get(node_id)
        .map(extract_outputs)
        .unwrap_or_default();

    if !outputs.is_empty() {
        return HistoryLookup::Ready(outputs);
    }

    match &entry.status {
        Some(status) if status.completed => HistoryLookup::Empty,
        _ => HistoryLookup::Pending,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn history(value: serde_json::Value) -> History {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn images_win_over_gifs() {
        let out = extract_outputs(&json!({
            "gifs": [{"filename": "clip.mp4", "subfolder": "", "type": "output"}],
            "images": [{"filename": "frame.png", "subfolder": "", "type": "output"}],
        }));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].filename, "frame.png");
    }

    #[test]
    fn empty_lists_fall_through() {
        let out = extract_outputs(&json!({
            "images": [],
            "gifs": [],
            "audio": [{"filename": "voice.flac", "subfolder": "audio", "type": "output"}],
        }));
        assert_eq!(out[0].filename, "voice.flac");
        assert_eq!(out[0].subfolder, "audio");
    }

    #[test]
    fn filenames_only_are_used() {
        let out = extract_outputs(&json!({"filenames": ["a.mp4"]}));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].filename, "a.mp4");
        assert_eq!(out[0].folder_type, "output");
    }

    #[test]
    fn no_known_keys_yields_nothing() {
        assert!(extract_outputs(&json!({"text": ["hello"]})).is_empty());
        assert!(extract_outputs(&json!(null)).is_empty());
    }

    #[test]
    fn lookup_missing_prompt_is_pending() {
        assert_eq!(lookup_outputs(&History::new(), "p1", "9"), HistoryLookup::Pending);
    }

    #[test]
    fn lookup_ready() {
        let h = history(json!({
            "p1": {
                "outputs": {"9": {"gifs": [{"filename": "out.mp4", "subfolder": "", "type": "output"}]}},
                "status": {"status_str": "success", "completed": true},
            }
        }));
        match lookup_outputs(&h, "p1", "9") {
            HistoryLookup::Ready(out) => assert_eq!(out[0].filename, "out.mp4"),
            other => panic!("Expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn lookup_completed_without_node_output_is_empty() {
        let h = history(json!({
            "p1": {
                "outputs": {"3": {"images": [{"filename": "other.png"}]}},
                "status": {"status_str": "success", "completed": true},
            }
        }));
        assert_eq!(lookup_outputs(&h, "p1", "9"), HistoryLookup::Empty);
    }

    #[test]
    fn lookup_incomplete_without_node_output_is_pending() {
        let h = history(json!({"p1": {"outputs": {}}}));
        assert_eq!(lookup_outputs(&h, "p1", "9"), HistoryLookup::Pending);
    }
}
