use std::time::Duration;

use crate::model::{DEFAULT_DETECTOR_BACKEND, ModelFamily};

/// Builder-style configuration for embedder implementations.
#[derive(Debug, Clone, Default)]
pub struct EmbedConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: ModelFamily,
    pub detector_backend: String,
    /// Expected vector length. 0 disables the check.
    pub dimension: usize,
    pub timeout: Option<Duration>,
}

impl EmbedConfig {
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = key.to_string();
        self
    }

    pub fn with_model(mut self, model: ModelFamily) -> Self {
        self.model = model;
        self
    }

    pub fn with_detector_backend(mut self, backend: &str) -> Self {
        self.detector_backend = backend.to_string();
        self
    }

    pub fn with_dimension(mut self, dim: usize) -> Self {
        self.dimension = dim;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn detector_or_default(&self) -> String {
        if self.detector_backend.is_empty() {
            DEFAULT_DETECTOR_BACKEND.to_string()
        } else {
            self.detector_backend.clone()
        }
    }
}
