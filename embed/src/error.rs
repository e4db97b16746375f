use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embed: empty input")]
    EmptyInput,

    #[error("embed: invalid image locator: {0}")]
    InvalidLocator(String),

    #[error("embed: invalid input: {0}")]
    InvalidInput(String),

    #[error("embed: no face detected")]
    NoFaceDetected,

    #[error("embed: decode error: {0}")]
    Decode(String),

    #[error("embed: model error: {0}")]
    Model(String),

    #[error("embed: API error: {0}")]
    Api(String),

    #[error("embed: timed out after {0:?}")]
    Timeout(Duration),

    #[error("embed: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Coarse failure class carried on the wire next to the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    NoFace,
    Decode,
    Model,
    Unavailable,
}

impl EmbedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput | Self::InvalidLocator(_) | Self::InvalidInput(_) => {
                ErrorKind::Input
            }
            Self::NoFaceDetected => ErrorKind::NoFace,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Model(_) | Self::DimensionMismatch { .. } => ErrorKind::Model,
            Self::Api(_) | Self::Timeout(_) => ErrorKind::Unavailable,
        }
    }

    /// Rebuilds an error from a wire message and optional kind.
    ///
    /// Services that do not send a kind are classified by message text, so
    /// plain `{"error": "No face detected"}` replies still map to
    /// [`EmbedError::NoFaceDetected`].
    pub fn from_wire(message: &str, kind: Option<ErrorKind>) -> Self {
        let kind = kind.unwrap_or_else(|| classify(message));
        match kind {
            ErrorKind::Input => Self::InvalidInput(message.to_string()),
            ErrorKind::NoFace => Self::NoFaceDetected,
            ErrorKind::Decode => Self::Decode(message.to_string()),
            ErrorKind::Model => Self::Model(message.to_string()),
            ErrorKind::Unavailable => Self::Api(message.to_string()),
        }
    }
}

fn classify(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("no face") || lower.contains("face could not be detected") {
        ErrorKind::NoFace
    } else if lower.contains("invalid image")
        || lower.contains("decode")
        || lower.contains("cannot identify image")
    {
        ErrorKind::Decode
    } else {
        ErrorKind::Model
    }
}
