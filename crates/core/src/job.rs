//! Job payload and result types exchanged with the intake platform,
//! plus the artifact descriptors reported by the execution engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::graph::WorkflowGraph;

/// Storage namespace used by the engine when a descriptor omits `type`.
pub const DEFAULT_FOLDER_TYPE: &str = "output";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// An image to download and inject into one specific node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSlot {
    pub url: String,
    pub node_id: String,
}

impl ImageSlot {
    /// Parse one entry of the `images` list.
    ///
    /// Returns `None` for entries that are not objects or lack a string
    /// `url` / a string-or-number `node_id`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let url = obj.get("url")?.as_str().filter(|u| !u.is_empty())?;
        let node_id = match obj.get("node_id")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Self {
            url: url.to_string(),
            node_id,
        })
    }
}

/// A parsed job payload.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub workflow: WorkflowGraph,
    /// Driving video, injected into every `VHS_LoadVideo` node.
    pub video_url: Option<String>,
    /// Reference image, injected into every `LoadImage` node.
    pub image_url: Option<String>,
    /// Per-node images for multi-character workflows.
    pub images: Vec<ImageSlot>,
    /// Number of `images` entries dropped because they were malformed.
    pub skipped_images: usize,
}

impl JobRequest {
    /// Parse the `input` object of a job.
    pub fn from_input(input: &Value) -> Result<Self, CoreError> {
        let obj = input.as_object().ok_or_else(|| {
            CoreError::Validation("job input must be a JSON object.".to_string())
        })?;

        let workflow = obj
            .get("workflow")
            .ok_or_else(|| {
                CoreError::Validation(
                    "'workflow' key is required and must be a valid JSON object.".to_string(),
                )
            })
            .and_then(WorkflowGraph::from_value)?;

        let video_url = optional_url(obj, "video_url")?;
        let image_url = optional_url(obj, "image_url")?;

        let (images, skipped_images) = match obj.get("images") {
            Some(Value::Array(entries)) => {
                let images: Vec<ImageSlot> =
                    entries.iter().filter_map(ImageSlot::from_value).collect();
                let skipped = entries.len() - images.len();
                (images, skipped)
            }
            _ => (Vec::new(), 0),
        };

        Ok(Self {
            workflow,
            video_url,
            image_url,
            images,
            skipped_images,
        })
    }
}

/// Read an optional URL field. `null` counts as absent.
fn optional_url(
    obj: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<String>, CoreError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(Some(s.trim().to_string())),
        Some(_) => Err(CoreError::Validation(format!(
            "'{key}' must be a non-empty string."
        ))),
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// The kind of artifact a workflow produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFamily {
    Video,
    Images,
}

impl OutputFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Images => "images",
        }
    }
}

impl std::fmt::Display for OutputFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of one produced file on the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDescriptor {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Engine storage namespace (`output`, `temp`, ...).
    #[serde(rename = "type", default = "default_folder_type")]
    pub folder_type: String,
}

fn default_folder_type() -> String {
    DEFAULT_FOLDER_TYPE.to_string()
}

impl OutputDescriptor {
    /// Interpret one entry of a history output list.
    ///
    /// Objects need a non-empty `filename`; a bare string is taken as the
    /// filename itself. Anything else yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(filename) if !filename.is_empty() => Some(Self {
                filename: filename.clone(),
                subfolder: String::new(),
                folder_type: default_folder_type(),
            }),
            Value::Object(obj) => {
                let filename = obj.get("filename")?.as_str().filter(|f| !f.is_empty())?;
                let text = |key: &str| obj.get(key).and_then(Value::as_str);
                Some(Self {
                    filename: filename.to_string(),
                    subfolder: text("subfolder").unwrap_or_default().to_string(),
                    folder_type: text("type").unwrap_or(DEFAULT_FOLDER_TYPE).to_string(),
                })
            }
            _ => None,
        }
    }
}

/// The artifacts of one completed execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBundle {
    pub family: OutputFamily,
    pub outputs: Vec<OutputDescriptor>,
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Terminal result returned to the intake platform.
///
/// Serializes as `{"video": [...]}`, `{"images": [...]}` or
/// `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobResult {
    Video(Vec<String>),
    Images(Vec<String>),
    Error(String),
}

impl JobResult {
    pub fn success(family: OutputFamily, urls: Vec<String>) -> Self {
        match family {
            OutputFamily::Video => Self::Video(urls),
            OutputFamily::Images => Self::Images(urls),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }
}
