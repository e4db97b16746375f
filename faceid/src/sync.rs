//! Catalog synchronization: fills absent embedding slots from each
//! identity's reference image.
//!
//! A run visits every record exactly once. Records whose slot is already
//! populated are left untouched, so running it again after new
//! registrations only extracts the new identities. Failures are recorded per
//! identity and never stop the run; a failed identity keeps an empty slot and
//! is picked up by the next run.
//!
//! Every vector written to a slot has the same length: either the configured
//! dimension or, when that is 0, the length of the vectors already in the
//! slot (or of the first vector written in this run).

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use facegate_embed::{FaceEmbedder, ImageSource};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::FaceIdError;
use crate::identity::IdentityRecord;
use crate::store::{self, IdentityStore};

/// Controls a synchronization run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Embedding slot to fill (e.g. "default", "facenet").
    pub slot: String,

    /// Maximum identities extracted concurrently. 0 is treated as 1.
    pub concurrency: usize,

    /// Upper bound on a single extraction.
    pub timeout: Duration,

    /// Required vector length. 0 infers it from the slot.
    pub dimension: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            slot: "default".into(),
            concurrency: 4,
            timeout: Duration::from_secs(30),
            dimension: 0,
        }
    }
}

/// What happened to one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    AlreadyPresent,
    Updated,
    SkippedNoImage,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityOutcome {
    pub identity_key: String,
    pub name: String,
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Summary of a synchronization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub slot: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub already_present: usize,
    pub updated: usize,
    pub skipped_no_image: usize,
    pub failed: usize,
    /// Per-identity outcomes in store order.
    pub outcomes: Vec<IdentityOutcome>,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

/// Runs catalog synchronization against a store. Store calls go through
/// tokio's blocking pool.
pub struct Synchronizer {
    store: Arc<dyn IdentityStore>,
    embedder: Arc<dyn FaceEmbedder>,
    cfg: SyncConfig,
}

impl Synchronizer {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        embedder: Arc<dyn FaceEmbedder>,
        cfg: SyncConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            cfg,
        }
    }

    /// Visits every identity once and fills the configured slot where absent.
    ///
    /// Only failing to list the store is an error; everything after that is
    /// reported per identity.
    pub async fn run(&self) -> Result<SyncReport, FaceIdError> {
        let started_at = Utc::now();
        let records = store::blocking(&self.store, |s| s.list()).await?;
        tracing::info!(
            slot = %self.cfg.slot,
            model = %self.embedder.model(),
            identities = records.len(),
            "faceid: sync started"
        );

        let dimension = OnceLock::new();
        let existing = if self.cfg.dimension != 0 {
            Some(self.cfg.dimension)
        } else {
            records
                .iter()
                .find_map(|r| r.embedding(&self.cfg.slot))
                .map(<[f32]>::len)
        };
        if let Some(d) = existing {
            let _ = dimension.set(d);
        }

        // `buffered` keeps outcomes in store order while running up to
        // `concurrency` extractions at once. Each record is owned by exactly
        // one future.
        let outcomes: Vec<IdentityOutcome> = futures::stream::iter(records)
            .map(|r| self.sync_one(r, &dimension))
            .buffered(self.cfg.concurrency.max(1))
            .collect()
            .await;

        let mut report = SyncReport {
            slot: self.cfg.slot.clone(),
            started_at,
            finished_at: Utc::now(),
            already_present: 0,
            updated: 0,
            skipped_no_image: 0,
            failed: 0,
            outcomes,
        };
        for o in &report.outcomes {
            match o.status {
                SyncStatus::AlreadyPresent => report.already_present += 1,
                SyncStatus::Updated => report.updated += 1,
                SyncStatus::SkippedNoImage => report.skipped_no_image += 1,
                SyncStatus::Failed => report.failed += 1,
            }
        }

        tracing::info!(
            slot = %report.slot,
            already_present = report.already_present,
            updated = report.updated,
            skipped_no_image = report.skipped_no_image,
            failed = report.failed,
            "faceid: sync finished"
        );
        Ok(report)
    }

    async fn sync_one(
        &self,
        record: IdentityRecord,
        dimension: &OnceLock<usize>,
    ) -> IdentityOutcome {
        let slot = self.cfg.slot.as_str();
        let outcome = |status: SyncStatus, reason: Option<String>| IdentityOutcome {
            identity_key: record.identity_key.clone(),
            name: record.name.clone(),
            status,
            reason,
        };

        if record.has_embedding(slot) {
            tracing::debug!(identity = %record.identity_key, "faceid: already has embedding");
            return outcome(SyncStatus::AlreadyPresent, None);
        }

        let Some(locator) = record.usable_image() else {
            tracing::warn!(identity = %record.identity_key, "faceid: skipping, no image");
            return outcome(SyncStatus::SkippedNoImage, Some("no image locator".into()));
        };

        let source = ImageSource::url(locator);
        let extraction = tokio::time::timeout(self.cfg.timeout, self.embedder.embed(&source));
        let extracted = match extraction.await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                tracing::warn!(identity = %record.identity_key, error = %e, "faceid: extraction failed");
                return outcome(SyncStatus::Failed, Some(e.to_string()));
            }
            Err(_) => {
                tracing::warn!(identity = %record.identity_key, timeout = ?self.cfg.timeout, "faceid: extraction timed out");
                return outcome(
                    SyncStatus::Failed,
                    Some(format!("extraction timed out after {:?}", self.cfg.timeout)),
                );
            }
        };

        if let Err(e) = check_vector(&extracted, dimension) {
            tracing::warn!(
                identity = %record.identity_key,
                error = %e,
                "faceid: rejected extracted embedding"
            );
            return outcome(SyncStatus::Failed, Some(e.to_string()));
        }

        let dim = extracted.len();
        let key = record.identity_key.clone();
        let slot_name = slot.to_string();
        let persisted =
            store::blocking(&self.store, move |s| s.set_embedding(&key, &slot_name, &extracted))
                .await;
        if let Err(e) = persisted {
            tracing::warn!(identity = %record.identity_key, error = %e, "faceid: persisting embedding failed");
            return outcome(SyncStatus::Failed, Some(e.to_string()));
        }

        tracing::debug!(identity = %record.identity_key, dim, "faceid: saved embedding");
        outcome(SyncStatus::Updated, None)
    }
}

/// Rejects empty or non-finite vectors and vectors whose length differs
/// from the slot's. The first accepted vector fixes the length when none is
/// known yet.
fn check_vector(v: &[f32], dimension: &OnceLock<usize>) -> Result<(), FaceIdError> {
    if v.is_empty() || v.iter().any(|x| !x.is_finite()) {
        return Err(FaceIdError::DegenerateVector);
    }
    let expected = *dimension.get_or_init(|| v.len());
    if expected != v.len() {
        return Err(FaceIdError::DimensionMismatch {
            expected,
            got: v.len(),
        });
    }
    Ok(())
}

/// Fills `cfg.slot` for every identity in `store` that lacks it.
pub async fn sync(
    store: Arc<dyn IdentityStore>,
    embedder: Arc<dyn FaceEmbedder>,
    cfg: SyncConfig,
) -> Result<SyncReport, FaceIdError> {
    Synchronizer::new(store, embedder, cfg).run().await
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use facegate_embed::{EmbedError, ModelFamily};

    use super::*;
    use crate::store::MemoryStore;

    /// Returns a fixed 2-d vector per URL; URLs containing "broken" fail,
    /// "overflow" yields an infinite component and "wide" a 3-d vector.
    struct FakeEmbedder {
        calls: Mutex<Vec<String>>,
    }

    impl FakeEmbedder {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl FaceEmbedder for FakeEmbedder {
        async fn embed(&self, image: &ImageSource) -> Result<Vec<f32>, EmbedError> {
            let ImageSource::Url(url) = image else {
                return Err(EmbedError::EmptyInput);
            };
            self.calls.lock().unwrap().push(url.clone());
            if url.contains("broken") {
                return Err(EmbedError::Decode("not an image".into()));
            }
            if url.contains("slow") {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if url.contains("overflow") {
                return Ok(vec![f32::INFINITY, 0.0]);
            }
            if url.contains("wide") {
                return Ok(vec![1.0, 2.0, 3.0]);
            }
            Ok(vec![url.len() as f32, 1.0])
        }

        fn model(&self) -> ModelFamily {
            ModelFamily::VggFace
        }

        fn detector_backend(&self) -> &str {
            "opencv"
        }
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_records([
            IdentityRecord::new("s1", "Ana").with_image("https://img/ana.jpg"),
            IdentityRecord::new("s2", "Bea")
                .with_image("https://img/bea.jpg")
                .with_embedding("default", vec![0.5, 0.5]),
            IdentityRecord::new("s3", "Cy"),
            IdentityRecord::new("s4", "Dee").with_image("https://img/broken.jpg"),
            IdentityRecord::new("s5", "Eli").with_image("https://img/eli.jpg"),
        ]))
    }

    #[tokio::test]
    async fn counts_each_outcome() {
        let store = store();
        let embedder = Arc::new(FakeEmbedder::new());
        let report = sync(store.clone(), embedder.clone(), SyncConfig::default()).await.unwrap();

        assert_eq!(report.total(), 5);
        assert_eq!(report.already_present, 1);
        assert_eq!(report.updated, 2);
        assert_eq!(report.skipped_no_image, 1);
        assert_eq!(report.failed, 1);

        let statuses: Vec<SyncStatus> = report.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                SyncStatus::Updated,
                SyncStatus::AlreadyPresent,
                SyncStatus::SkippedNoImage,
                SyncStatus::Failed,
                SyncStatus::Updated,
            ]
        );
        assert!(report.outcomes[3].reason.as_deref().unwrap().contains("not an image"));

        // s2 was never sent to the extractor.
        let calls: HashSet<String> = embedder.calls().into_iter().collect();
        assert!(!calls.contains("https://img/bea.jpg"));
        assert_eq!(
            store.get("s2").unwrap().unwrap().embedding("default"),
            Some(&[0.5, 0.5][..])
        );
    }

    #[tokio::test]
    async fn failure_does_not_stop_later_identities() {
        let store = store();
        let embedder = Arc::new(FakeEmbedder::new());
        let cfg = SyncConfig {
            concurrency: 1,
            ..SyncConfig::default()
        };
        let report = sync(store.clone(), embedder.clone(), cfg).await.unwrap();

        assert_eq!(report.failed, 1);
        assert!(store.get("s5").unwrap().unwrap().has_embedding("default"));
        assert!(!store.get("s4").unwrap().unwrap().has_embedding("default"));
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let store = store();
        let embedder = Arc::new(FakeEmbedder::new());
        sync(store.clone(), embedder.clone(), SyncConfig::default()).await.unwrap();
        let before = store.list().unwrap();
        let calls_before = embedder.calls().len();

        let report = sync(store.clone(), embedder.clone(), SyncConfig::default()).await.unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.already_present, 3);
        assert_eq!(store.list().unwrap(), before);
        // Only the still-broken identity is retried.
        assert_eq!(embedder.calls().len(), calls_before + 1);
    }

    #[tokio::test]
    async fn slots_are_independent() {
        let store = store();
        let embedder = Arc::new(FakeEmbedder::new());
        let cfg = SyncConfig {
            slot: "facenet".into(),
            ..SyncConfig::default()
        };
        let report = sync(store.clone(), embedder.clone(), cfg).await.unwrap();
        assert_eq!(report.already_present, 0);
        assert_eq!(report.updated, 3);
        let bea = store.get("s2").unwrap().unwrap();
        assert_eq!(bea.embedding("default"), Some(&[0.5, 0.5][..]));
        assert!(bea.has_embedding("facenet"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_a_per_identity_failure() {
        let store = Arc::new(MemoryStore::with_records([
            IdentityRecord::new("a", "Ana").with_image("https://img/slow.jpg"),
            IdentityRecord::new("b", "Bea").with_image("https://img/bea.jpg"),
        ]));
        let embedder = Arc::new(FakeEmbedder::new());
        let cfg = SyncConfig {
            timeout: Duration::from_secs(5),
            ..SyncConfig::default()
        };
        let report = sync(store.clone(), embedder.clone(), cfg).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.updated, 1);
        assert!(report.outcomes[0].reason.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn missing_record_at_persist_time_is_a_failure() {
        /// Lists a record that cannot be written.
        struct Phantom;
        impl IdentityStore for Phantom {
            fn list(&self) -> Result<Vec<IdentityRecord>, FaceIdError> {
                Ok(vec![IdentityRecord::new("p", "Pat").with_image("https://img/p.jpg")])
            }
            fn get(&self, _: &str) -> Result<Option<IdentityRecord>, FaceIdError> {
                Ok(None)
            }
            fn upsert(&self, _: &IdentityRecord) -> Result<(), FaceIdError> {
                Ok(())
            }
            fn set_embedding(&self, key: &str, _: &str, _: &[f32]) -> Result<(), FaceIdError> {
                Err(FaceIdError::Persistence(format!("write rejected for {key}")))
            }
        }

        let report = sync(Arc::new(Phantom), Arc::new(FakeEmbedder::new()), SyncConfig::default())
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert!(report.outcomes[0].reason.as_deref().unwrap().contains("write rejected"));
    }

    #[tokio::test]
    async fn non_finite_extraction_keeps_store_readable() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(crate::redb_store::RedbStore::open(dir.path().join("ids.redb")).unwrap());
        store
            .upsert(&IdentityRecord::new("a", "Ana").with_image("https://img/overflow.jpg"))
            .unwrap();
        store
            .upsert(&IdentityRecord::new("b", "Bea").with_image("https://img/bea.jpg"))
            .unwrap();

        let report = sync(store.clone(), Arc::new(FakeEmbedder::new()), SyncConfig::default())
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.outcomes[0].status, SyncStatus::Failed);

        let records = store.list().unwrap();
        assert!(!records[0].has_embedding("default"));
        assert!(records[1].has_embedding("default"));
    }

    #[tokio::test]
    async fn wrong_length_extraction_is_a_per_identity_failure() {
        // s2 already holds a 2-d vector in "default".
        let store = store();
        store
            .upsert(&IdentityRecord::new("s6", "Fay").with_image("https://img/wide.jpg"))
            .unwrap();
        let report = sync(store.clone(), Arc::new(FakeEmbedder::new()), SyncConfig::default())
            .await
            .unwrap();

        let fay = report.outcomes.iter().find(|o| o.identity_key == "s6").unwrap();
        assert_eq!(fay.status, SyncStatus::Failed);
        assert!(fay.reason.as_deref().unwrap().contains("dimension mismatch"));
        assert!(!store.get("s6").unwrap().unwrap().has_embedding("default"));
        assert_eq!(report.updated, 2);
    }

    #[tokio::test]
    async fn configured_dimension_is_enforced() {
        let store = Arc::new(MemoryStore::with_records([
            IdentityRecord::new("a", "Ana").with_image("https://img/ana.jpg"),
            IdentityRecord::new("b", "Bea").with_image("https://img/wide.jpg"),
        ]));
        let cfg = SyncConfig {
            slot: "facenet".into(),
            dimension: 3,
            ..SyncConfig::default()
        };
        let report = sync(store.clone(), Arc::new(FakeEmbedder::new()), cfg).await.unwrap();
        assert_eq!(report.outcomes[0].status, SyncStatus::Failed);
        assert_eq!(report.outcomes[1].status, SyncStatus::Updated);
    }
}
