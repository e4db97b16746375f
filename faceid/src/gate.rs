use std::sync::Arc;

use facegate_embed::{EmbedError, FaceEmbedder, ImageSource};

use crate::api::VerifyRequest;
use crate::error::FaceIdError;
use crate::export::{self, ExportRecord, ImportSummary};
use crate::resolver::{DEFAULT_THRESHOLD, MatchOutcome, MatchPolicy, PairVerdict, Resolver, verify_pair};
use crate::store::{self, IdentityStore};
use crate::sync::{SyncConfig, SyncReport, Synchronizer};

/// Controls a [`Gate`].
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Distance allowance; the similarity cutoff is `1 - threshold`.
    pub threshold: f32,
    pub policy: MatchPolicy,
    /// Embedding slot read for matching and filled by sync.
    pub slot: String,
    pub sync: SyncConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            policy: MatchPolicy::default(),
            slot: "default".into(),
            sync: SyncConfig::default(),
        }
    }
}

/// Entry point for the gate station: verification, on-demand extraction and
/// catalog synchronization over one embedder and one store.
///
/// Holds no catalog state; every verification reads the catalog it is given
/// or re-reads the store.
pub struct Gate {
    embedder: Arc<dyn FaceEmbedder>,
    store: Arc<dyn IdentityStore>,
    cfg: GateConfig,
}

impl Gate {
    pub fn new(
        embedder: Arc<dyn FaceEmbedder>,
        store: Arc<dyn IdentityStore>,
        mut cfg: GateConfig,
    ) -> Self {
        cfg.sync.slot = cfg.slot.clone();
        Self {
            embedder,
            store,
            cfg,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.cfg
    }

    pub fn store(&self) -> &dyn IdentityStore {
        self.store.as_ref()
    }

    pub fn embedder(&self) -> &dyn FaceEmbedder {
        self.embedder.as_ref()
    }

    /// Resolves a verification request.
    ///
    /// Malformed requests fail with [`FaceIdError::InvalidInput`]; a failed
    /// probe extraction is an `Ok(MatchOutcome::ExtractionFailed)`.
    pub async fn verify(&self, req: VerifyRequest) -> Result<MatchOutcome, FaceIdError> {
        let threshold = check_threshold(req.threshold.unwrap_or(self.cfg.threshold))?;
        let resolver = Resolver::new(threshold).with_policy(self.cfg.policy);

        let probe = match (req.probe, req.image_url, req.image) {
            (Some(v), None, None) if v.is_empty() => {
                return Err(FaceIdError::InvalidInput("probe vector is empty".into()));
            }
            (Some(v), None, None) if v.iter().any(|x| !x.is_finite()) => {
                return Err(FaceIdError::InvalidInput(
                    "probe vector has non-finite components".into(),
                ));
            }
            (Some(v), None, None) => Ok(v),
            (None, Some(url), None) => {
                self.extract_probe(&resolver, ImageSource::Url(url)).await?
            }
            (None, None, Some(bytes)) => {
                self.extract_probe(&resolver, ImageSource::Bytes(bytes)).await?
            }
            (None, None, None) => {
                return Err(FaceIdError::InvalidInput(
                    "missing probe: set one of probe, image_url or image".into(),
                ));
            }
            _ => {
                return Err(FaceIdError::InvalidInput(
                    "ambiguous probe: set only one of probe, image_url or image".into(),
                ));
            }
        };
        let probe = match probe {
            Ok(v) => v,
            Err(outcome) => return Ok(outcome),
        };

        let catalog = match req.catalog {
            Some(c) => c,
            None => {
                let slot = self.cfg.slot.clone();
                store::blocking(&self.store, move |s| s.catalog(&slot)).await?
            }
        };
        let outcome = resolver.resolve(&probe, &catalog);
        tracing::info!(
            verified = outcome.is_verified(),
            identity = outcome.identity_key().unwrap_or(""),
            catalog = catalog.len(),
            "faceid: verification"
        );
        Ok(outcome)
    }

    /// Extracts the probe; a failure becomes the final outcome and no catalog
    /// entry is scored.
    async fn extract_probe(
        &self,
        resolver: &Resolver,
        image: ImageSource,
    ) -> Result<Result<Vec<f32>, MatchOutcome>, FaceIdError> {
        match self.extract(&image).await {
            Ok(v) => Ok(Ok(v)),
            Err(
                EmbedError::EmptyInput | EmbedError::InvalidLocator(_) | EmbedError::InvalidInput(_),
            ) => Err(FaceIdError::InvalidInput(
                "probe image is empty or malformed".into(),
            )),
            Err(e) => {
                tracing::info!(error = %e, "faceid: probe extraction failed");
                Ok(Err(resolver.resolve_extracted(Err(e), &[])))
            }
        }
    }

    /// Extracts an embedding with the configured model and detector.
    /// Vectors with non-finite components are a model error.
    pub async fn extract(&self, image: &ImageSource) -> Result<Vec<f32>, EmbedError> {
        image.validate()?;
        let v = self.embedder.embed(image).await?;
        if v.iter().any(|x| !x.is_finite()) {
            return Err(EmbedError::Model("embedding has non-finite components".into()));
        }
        Ok(v)
    }

    /// Compares the faces in two images directly.
    pub async fn compare(
        &self,
        a: &ImageSource,
        b: &ImageSource,
        threshold: Option<f32>,
    ) -> Result<PairVerdict, FaceIdError> {
        let threshold = check_threshold(threshold.unwrap_or(self.cfg.threshold))?;
        let (va, vb) = futures::try_join!(self.extract(a), self.extract(b))?;
        verify_pair(&va, &vb, threshold)
    }

    /// Fills the configured slot for every identity that lacks it.
    pub async fn sync(&self) -> Result<SyncReport, FaceIdError> {
        Synchronizer::new(self.store.clone(), self.embedder.clone(), self.cfg.sync.clone())
            .run()
            .await
    }

    pub fn export(&self) -> Result<Vec<ExportRecord>, FaceIdError> {
        export::export(self.store.as_ref(), &self.cfg.slot)
    }

    pub fn import(&self, records: &[ExportRecord]) -> Result<ImportSummary, FaceIdError> {
        export::import(self.store.as_ref(), &self.cfg.slot, records)
    }
}

/// Accepts distance allowances in `[0, 2]`, i.e. cutoffs in `[-1, 1]`.
fn check_threshold(threshold: f32) -> Result<f32, FaceIdError> {
    if threshold.is_finite() && (0.0..=2.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(FaceIdError::InvalidInput(format!(
            "threshold {threshold} outside [0, 2]"
        )))
    }
}
