use facegate_embed::EmbedError;
use thiserror::Error;

/// Errors returned by faceid operations.
#[derive(Debug, Error)]
pub enum FaceIdError {
    #[error("faceid: invalid input: {0}")]
    InvalidInput(String),

    #[error("faceid: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("faceid: degenerate vector (zero magnitude or non-finite component)")]
    DegenerateVector,

    #[error("faceid: extraction failed: {0}")]
    Extraction(#[from] EmbedError),

    #[error("faceid: persistence error: {0}")]
    Persistence(String),

    #[error("faceid: identity not found: {0}")]
    NotFound(String),

    #[error("faceid: serialization error: {0}")]
    Serialization(String),

    #[error("faceid: io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for FaceIdError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
