use bytes::Bytes;

use crate::error::EmbedError;
use crate::model::ModelFamily;

/// Where a face image comes from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Raw encoded image (JPEG, PNG, ...), e.g. a gate camera upload.
    Bytes(Bytes),
    /// Remote image locator, fetched by the model service.
    Url(String),
}

impl ImageSource {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self::Bytes(data.into())
    }

    /// Rejects empty payloads and malformed locators before any network call.
    pub fn validate(&self) -> Result<(), EmbedError> {
        match self {
            Self::Bytes(b) if b.is_empty() => Err(EmbedError::EmptyInput),
            Self::Bytes(_) => Ok(()),
            Self::Url(u) if u.trim().is_empty() => Err(EmbedError::EmptyInput),
            Self::Url(u) => url::Url::parse(u.trim())
                .map(|_| ())
                .map_err(|e| EmbedError::InvalidLocator(format!("{u}: {e}"))),
        }
    }
}

/// FaceEmbedder converts a face image into a dense f32 vector.
///
/// This is the only boundary that reaches the embedding model. The model
/// family and detector backend are fixed per instance so every vector it
/// produces lands in the same comparable space.
///
/// Implementations must be safe for concurrent use (Send + Sync).
#[async_trait::async_trait]
pub trait FaceEmbedder: Send + Sync {
    /// Return the embedding of the (single) face in the image.
    async fn embed(&self, image: &ImageSource) -> Result<Vec<f32>, EmbedError>;

    /// Return the model family every output vector belongs to.
    fn model(&self) -> ModelFamily;

    /// Return the face detector backend name.
    fn detector_backend(&self) -> &str;
}
