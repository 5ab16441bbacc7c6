use crate::graph::{SAVE_IMAGE_CLASS, VIDEO_COMBINE_CLASS};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Input error: {0}")]
    Validation(String),

    #[error(
        "Workflow must contain a '{}' or '{}' node for output.",
        VIDEO_COMBINE_CLASS,
        SAVE_IMAGE_CLASS
    )]
    NoOutputNode,
}
