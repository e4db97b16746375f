use serde::{Deserialize, Serialize};

use crate::error::{EmbedError, ErrorKind};

/// Multipart field carrying the image on `POST /extract-embedding`.
pub const FILE_FIELD: &str = "file";

/// Body of `POST /extract-embedding-from-url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector_backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_detection: Option<bool>,
}

/// Reply of both extraction endpoints: either `embedding` or `error`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl ExtractReply {
    pub fn from_result(result: Result<Vec<f32>, EmbedError>) -> Self {
        match result {
            Ok(embedding) => Self {
                embedding: Some(embedding),
                ..Self::default()
            },
            Err(e) => Self {
                embedding: None,
                kind: Some(e.kind()),
                error: Some(e.to_string()),
            },
        }
    }

    pub fn into_result(self) -> Result<Vec<f32>, EmbedError> {
        if let Some(message) = self.error {
            return Err(EmbedError::from_wire(&message, self.kind));
        }
        match self.embedding {
            Some(v) if v.is_empty() => Err(EmbedError::Model("empty embedding".into())),
            Some(v) if v.iter().any(|x| !x.is_finite()) => Err(EmbedError::Model(
                "embedding has non-finite components".into(),
            )),
            Some(v) => Ok(v),
            None => Err(EmbedError::Api("reply has neither embedding nor error".into())),
        }
    }
}
