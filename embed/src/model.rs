use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Face detector used by the model service before embedding.
pub const DEFAULT_DETECTOR_BACKEND: &str = "opencv";

/// Detection is never enforced: low-confidence detections still produce an
/// embedding instead of a hard failure.
pub const ENFORCE_DETECTION: bool = false;

/// Embedding model family. Vectors are only comparable within one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelFamily {
    #[default]
    #[serde(rename = "VGG-Face", alias = "vgg-face", alias = "vggface")]
    VggFace,
    #[serde(rename = "Facenet", alias = "facenet")]
    Facenet,
}

impl ModelFamily {
    /// Model name as the embedding service expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VggFace => "VGG-Face",
            Self::Facenet => "Facenet",
        }
    }

    /// Storage slot that holds this family's reference embeddings.
    pub fn default_slot(&self) -> &'static str {
        match self {
            Self::VggFace => "default",
            Self::Facenet => "facenet",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vgg-face" | "vggface" | "vgg" => Ok(Self::VggFace),
            "facenet" => Ok(Self::Facenet),
            _ => Err(format!("unknown model family: {s}")),
        }
    }
}
