use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Io Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("tensor `{tensor}` has shape {actual:?}, expected {expected}")]
    ShapeMismatch {
        tensor: &'static str,
        actual: Vec<usize>,
        expected: String,
    },

    #[error("detector is configured for {configured:?} output but got {received:?}")]
    LayoutMismatch {
        configured: crate::detector::OutputLayout,
        received: crate::detector::OutputLayout,
    },
}
