use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};

use crate::config::EmbedConfig;
use crate::embed::{FaceEmbedder, ImageSource};
use crate::error::EmbedError;
use crate::model::{DEFAULT_DETECTOR_BACKEND, ENFORCE_DETECTION, ModelFamily};
use crate::wire::{ExtractReply, FILE_FIELD, UrlRequest};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Embedder backed by an HTTP face-embedding model service.
///
/// Speaks the two-endpoint protocol:
/// - `POST {base}/extract-embedding` with a multipart `file`
/// - `POST {base}/extract-embedding-from-url` with `{"url": ...}`
///
/// Both reply `{"embedding": [...]}` or `{"error": "...", "kind": "..."}`.
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: ModelFamily,
    detector_backend: String,
    dim: usize,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: String::new(),
            model: ModelFamily::default(),
            detector_backend: DEFAULT_DETECTOR_BACKEND.to_string(),
            dim: 0,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_config(cfg: EmbedConfig) -> Result<Self, EmbedError> {
        let timeout = cfg.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbedError::Api(e.to_string()))?;
        let base_url = if cfg.base_url.is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            cfg.base_url.trim_end_matches('/').to_string()
        };
        Ok(Self {
            client,
            base_url,
            detector_backend: cfg.detector_or_default(),
            api_key: cfg.api_key,
            model: cfg.model,
            dim: cfg.dimension,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.header("Authorization", format!("Bearer {}", self.api_key))
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> EmbedError {
        if e.is_timeout() {
            EmbedError::Timeout(self.timeout)
        } else {
            EmbedError::Api(e.to_string())
        }
    }

    async fn call(&self, req: RequestBuilder) -> Result<Vec<f32>, EmbedError> {
        let resp = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.transport_error(e))?;

        let reply: ExtractReply = match serde_json::from_str(&body) {
            Ok(r) => r,
            Err(_) if !status.is_success() => {
                return Err(EmbedError::Api(format!("HTTP {status}: {body}")));
            }
            Err(e) => return Err(EmbedError::Api(format!("invalid reply: {e}"))),
        };
        if !status.is_success() && reply.error.is_none() {
            return Err(EmbedError::Api(format!("HTTP {status}: {body}")));
        }

        let embedding = reply.into_result()?;
        if self.dim != 0 && embedding.len() != self.dim {
            return Err(EmbedError::DimensionMismatch {
                expected: self.dim,
                got: embedding.len(),
            });
        }
        Ok(embedding)
    }
}

#[async_trait::async_trait]
impl FaceEmbedder for HttpEmbedder {
    async fn embed(&self, image: &ImageSource) -> Result<Vec<f32>, EmbedError> {
        image.validate()?;
        tracing::debug!(model = %self.model, backend = %self.detector_backend, "embed: extracting");

        match image {
            ImageSource::Bytes(data) => {
                let form = Form::new()
                    .part(FILE_FIELD, Part::bytes(data.to_vec()).file_name("probe.jpg"))
                    .text("model_name", self.model.as_str())
                    .text("detector_backend", self.detector_backend.clone())
                    .text("enforce_detection", ENFORCE_DETECTION.to_string());
                let url = format!("{}/extract-embedding", self.base_url);
                self.call(self.client.post(url).multipart(form)).await
            }
            ImageSource::Url(u) => {
                let body = UrlRequest {
                    url: u.trim().to_string(),
                    model_name: Some(self.model.as_str().to_string()),
                    detector_backend: Some(self.detector_backend.clone()),
                    enforce_detection: Some(ENFORCE_DETECTION),
                };
                let url = format!("{}/extract-embedding-from-url", self.base_url);
                self.call(self.client.post(url).json(&body)).await
            }
        }
    }

    fn model(&self) -> ModelFamily {
        self.model
    }

    fn detector_backend(&self) -> &str {
        &self.detector_backend
    }
}
