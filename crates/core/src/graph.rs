//! Workflow graph model and the operations the pipeline performs on it.
//!
//! A workflow is a mapping from node id to [`NodeSpec`]. Nodes are
//! addressed by their declared `class_type`; apart from that the graph
//! is treated as opaque and re-submitted verbatim.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::job::OutputFamily;

// ---------------------------------------------------------------------------
// Node class constants
// ---------------------------------------------------------------------------

/// Video loader node (VideoHelperSuite). Receives `video_url` downloads.
pub const LOAD_VIDEO_CLASS: &str = "VHS_LoadVideo";
/// Image loader node. Receives `image_url` downloads.
pub const LOAD_IMAGE_CLASS: &str = "LoadImage";
/// Video-combine sink node (VideoHelperSuite).
pub const VIDEO_COMBINE_CLASS: &str = "VHS_VideoCombine";
/// Image-save sink node.
pub const SAVE_IMAGE_CLASS: &str = "SaveImage";

/// Input field of a video loader node.
pub const VIDEO_INPUT_FIELD: &str = "video";
/// Input field of an image loader node.
pub const IMAGE_INPUT_FIELD: &str = "image";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single node of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Identifies the node's behavior on the engine.
    pub class_type: String,
    /// Input name to value (string, number, or `[node_id, slot]` reference).
    #[serde(default)]
    pub inputs: Map<String, Value>,
    /// Any other keys (`_meta`, ...) carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Where the final artifact of a workflow comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub node_id: String,
    pub family: OutputFamily,
}

/// Workflow graph keyed by node id, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowGraph {
    nodes: IndexMap<String, NodeSpec>,
}

impl WorkflowGraph {
    /// Build a graph from the raw `workflow` value of a job payload.
    ///
    /// The value must be a non-empty JSON object whose entries each carry
    /// a string `class_type`.
    pub fn from_value(value: &Value) -> Result<Self, CoreError> {
        let obj = match value {
            Value::Object(obj) if !obj.is_empty() => obj,
            _ => {
                return Err(CoreError::Validation(
                    "'workflow' key is required and must be a valid JSON object.".to_string(),
                ))
            }
        };

        let mut nodes = IndexMap::with_capacity(obj.len());
        for (node_id, node) in obj {
            let spec = NodeSpec::deserialize(node).map_err(|e| {
                CoreError::Validation(format!("workflow node '{node_id}' is malformed: {e}"))
            })?;
            nodes.insert(node_id.clone(), spec);
        }

        Ok(Self { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeSpec> {
        self.nodes.get(node_id)
    }

    /// Iterate `(node_id, spec)` pairs in graph order.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &NodeSpec)> {
        self.nodes.iter().map(|(id, spec)| (id.as_str(), spec))
    }

    /// All node ids whose `class_type` equals `class_type`, in graph order.
    pub fn find_nodes_by_class(&self, class_type: &str) -> Vec<&str> {
        self.nodes()
            .filter(|(_, spec)| spec.class_type == class_type)
            .map(|(id, _)| id)
            .collect()
    }

    /// Set `inputs[field] = value` on the selected nodes.
    ///
    /// With `target_node_id`, only that node is touched (whatever its
    /// class) and a missing target is skipped. Without it, every node of
    /// `class_type` is touched. Returns the ids that were modified, which
    /// is empty when nothing matched.
    pub fn inject(
        &mut self,
        class_type: &str,
        field: &str,
        value: impl Into<Value>,
        target_node_id: Option<&str>,
    ) -> Vec<String> {
        let value = value.into();

        let selected: Vec<String> = match target_node_id {
            Some(target) if self.contains_node(target) => vec![target.to_string()],
            Some(_) => Vec::new(),
            None => self
                .find_nodes_by_class(class_type)
                .into_iter()
                .map(str::to_string)
                .collect(),
        };

        for node_id in &selected {
            if let Some(spec) = self.nodes.get_mut(node_id) {
                spec.inputs.insert(field.to_string(), value.clone());
            }
        }

        selected
    }

    /// Pick the node producing the final artifact.
    ///
    /// A video-combine sink wins over an image-save sink; within a class
    /// the first node in graph order is used.
    pub fn locate_output(&self) -> Result<OutputTarget, CoreError> {
        let candidates = [
            (VIDEO_COMBINE_CLASS, OutputFamily::Video),
            (SAVE_IMAGE_CLASS, OutputFamily::Images),
        ];

        candidates
            .into_iter()
            .find_map(|(class_type, family)| {
                self.find_nodes_by_class(class_type)
                    .first()
                    .map(|node_id| OutputTarget {
                        node_id: node_id.to_string(),
                        family,
                    })
            })
            .ok_or(CoreError::NoOutputNode)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn graph(value: Value) -> WorkflowGraph {
        WorkflowGraph::from_value(&value).unwrap()
    }

    fn sample() -> WorkflowGraph {
        graph(json!({
            "1": {"class_type": "VHS_LoadVideo", "inputs": {"video": "placeholder.mp4"}},
            "2": {"class_type": "LoadImage", "inputs": {"image": "ref.png"}},
            "3": {"class_type": "LoadImage", "inputs": {}},
            "4": {"class_type": "KSampler", "inputs": {"seed": 7, "model": ["9", 0]}},
            "5": {"class_type": "VHS_VideoCombine", "inputs": {"frame_rate": 16}},
        }))
    }

    #[test]
    fn find_nodes_returns_exactly_matching_ids() {
        let g = sample();
        for class in ["LoadImage", "VHS_LoadVideo", "KSampler", "Missing"] {
            let found: HashSet<&str> = g.find_nodes_by_class(class).into_iter().collect();
            let expected: HashSet<&str> = g
                .nodes()
                .filter(|(_, spec)| spec.class_type == class)
                .map(|(id, _)| id)
                .collect();
            assert_eq!(found, expected, "class {class}");
        }
    }

    #[test]
    fn find_nodes_keeps_graph_order() {
        let g = graph(json!({
            "10": {"class_type": "LoadImage"},
            "2": {"class_type": "LoadImage"},
            "7": {"class_type": "LoadImage"},
        }));
        assert_eq!(g.find_nodes_by_class("LoadImage"), vec!["10", "2", "7"]);
    }

    #[test]
    fn inject_without_target_updates_every_match() {
        let mut g = sample();
        let modified = g.inject(LOAD_IMAGE_CLASS, IMAGE_INPUT_FIELD, "new.png", None);
        assert_eq!(modified, vec!["2", "3"]);
        assert_eq!(g.node("2").unwrap().inputs["image"], "new.png");
        assert_eq!(g.node("3").unwrap().inputs["image"], "new.png");
    }

    #[test]
    fn inject_with_absent_target_leaves_graph_unchanged() {
        let mut g = sample();
        let before = g.clone();
        let modified = g.inject(LOAD_IMAGE_CLASS, IMAGE_INPUT_FIELD, "a.png", Some("42"));
        assert!(modified.is_empty());
        assert_eq!(g, before);
    }

    #[test]
    fn inject_with_target_touches_only_that_node() {
        let mut g = sample();
        let modified = g.inject(LOAD_IMAGE_CLASS, IMAGE_INPUT_FIELD, "a.png", Some("3"));
        assert_eq!(modified, vec!["3"]);
        assert_eq!(g.node("2").unwrap().inputs["image"], "ref.png");
        assert_eq!(g.node("3").unwrap().inputs["image"], "a.png");
    }

    #[test]
    fn inject_with_target_ignores_class_type() {
        let mut g = sample();
        let modified = g.inject(LOAD_IMAGE_CLASS, IMAGE_INPUT_FIELD, "a.png", Some("4"));
        assert_eq!(modified, vec!["4"]);
        assert_eq!(g.node("4").unwrap().inputs["image"], "a.png");
        assert_eq!(g.node("4").unwrap().inputs["seed"], 7);
    }

    #[test]
    fn inject_without_matching_class_is_a_no_op() {
        let mut g = graph(json!({"1": {"class_type": "SaveImage", "inputs": {}}}));
        let before = g.clone();
        assert!(g.inject(LOAD_VIDEO_CLASS, VIDEO_INPUT_FIELD, "v.mp4", None).is_empty());
        assert_eq!(g, before);
    }

    #[test]
    fn locate_prefers_video_combine() {
        let g = graph(json!({
            "1": {"class_type": "SaveImage", "inputs": {}},
            "2": {"class_type": "VHS_VideoCombine", "inputs": {}},
        }));
        let target = g.locate_output().unwrap();
        assert_eq!(target.node_id, "2");
        assert_eq!(target.family, OutputFamily::Video);
    }

    #[test]
    fn locate_falls_back_to_first_save_image() {
        let g = graph(json!({
            "8": {"class_type": "SaveImage", "inputs": {}},
            "3": {"class_type": "SaveImage", "inputs": {}},
        }));
        let target = g.locate_output().unwrap();
        assert_eq!(target.node_id, "8");
        assert_eq!(target.family, OutputFamily::Images);
    }

    #[test]
    fn locate_without_sink_fails() {
        let g = graph(json!({"1": {"class_type": "LoadImage", "inputs": {}}}));
        let err = g.locate_output().unwrap_err();
        assert_matches!(err, CoreError::NoOutputNode);
        let message = err.to_string();
        assert!(message.contains("'VHS_VideoCombine' or 'SaveImage'"), "{message}");
    }

    #[test]
    fn from_value_rejects_non_objects_and_empty_graphs() {
        for bad in [json!(null), json!("x"), json!([1, 2]), json!({})] {
            assert_matches!(WorkflowGraph::from_value(&bad), Err(CoreError::Validation(_)));
        }
    }

    #[test]
    fn from_value_rejects_node_without_class_type() {
        let err = WorkflowGraph::from_value(&json!({"1": {"inputs": {}}})).unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg.contains("'1'"));
    }

    #[test]
    fn serialization_preserves_extra_node_keys() {
        let g = graph(json!({
            "1": {"class_type": "LoadImage", "_meta": {"title": "Ref"}},
        }));
        let out = serde_json::to_value(&g).unwrap();
        assert_eq!(out["1"]["_meta"]["title"], "Ref");
        assert_eq!(out["1"]["class_type"], "LoadImage");
        assert!(out["1"]["inputs"].as_object().unwrap().is_empty());
    }
}
