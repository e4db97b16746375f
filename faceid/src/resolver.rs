use facegate_embed::EmbedError;
use serde::{Deserialize, Serialize};

use crate::cosine::cosine_similarity;
use crate::error::FaceIdError;
use crate::identity::CatalogEntry;

/// Default distance allowance. The similarity cutoff is `1 - threshold`,
/// i.e. 0.32.
pub const DEFAULT_THRESHOLD: f32 = 0.68;

/// How the resolver picks among candidates above the cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Stop at the first candidate in catalog order.
    #[default]
    #[serde(alias = "first")]
    FirstMatch,
    /// Scan everything and keep the highest score; ties go to the earlier entry.
    #[serde(alias = "best")]
    BestMatch,
}

/// Result of one resolution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Verified {
        identity_key: String,
        name: String,
        similarity: f32,
    },
    Unverified,
    ExtractionFailed {
        reason: String,
    },
}

impl MatchOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    pub fn identity_key(&self) -> Option<&str> {
        match self {
            Self::Verified { identity_key, .. } => Some(identity_key),
            _ => None,
        }
    }
}

/// Decides which catalog identity, if any, a probe vector belongs to.
///
/// `threshold` is a distance allowance, not a similarity cutoff: an entry is
/// a candidate when `similarity > 1 - threshold`. Raising the threshold
/// therefore loosens acceptance.
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    threshold: f32,
    policy: MatchPolicy,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Resolver {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            policy: MatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Similarity an entry must strictly exceed to be a candidate.
    pub fn cutoff(&self) -> f32 {
        1.0 - self.threshold
    }

    /// Resolves `probe` against `catalog`, scanned in the given order.
    ///
    /// Entries that cannot be scored (length mismatch, zero vector) are
    /// logged and treated as non-candidates; they never fail the resolution.
    pub fn resolve(&self, probe: &[f32], catalog: &[CatalogEntry]) -> MatchOutcome {
        let cutoff = self.cutoff();
        let mut best: Option<(&CatalogEntry, f32)> = None;

        for entry in catalog {
            let sim = match cosine_similarity(probe, &entry.embedding) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(identity = %entry.identity_key, error = %e, "faceid: skipping unscorable catalog entry");
                    continue;
                }
            };
            tracing::debug!(identity = %entry.identity_key, similarity = sim, cutoff, "faceid: compared");

            if sim.is_nan() || sim <= cutoff {
                continue;
            }
            match self.policy {
                MatchPolicy::FirstMatch => {
                    best = Some((entry, sim));
                    break;
                }
                MatchPolicy::BestMatch => {
                    if best.is_none_or(|(_, b)| sim > b) {
                        best = Some((entry, sim));
                    }
                }
            }
        }

        match best {
            Some((entry, similarity)) => MatchOutcome::Verified {
                identity_key: entry.identity_key.clone(),
                name: entry.name.clone(),
                similarity,
            },
            None => MatchOutcome::Unverified,
        }
    }

    /// Resolves the result of an upstream extraction. A failed extraction
    /// short-circuits to [`MatchOutcome::ExtractionFailed`] without scoring.
    pub fn resolve_extracted(
        &self,
        probe: Result<Vec<f32>, EmbedError>,
        catalog: &[CatalogEntry],
    ) -> MatchOutcome {
        match probe {
            Ok(v) => self.resolve(&v, catalog),
            Err(e) => MatchOutcome::ExtractionFailed {
                reason: e.to_string(),
            },
        }
    }
}

/// Resolves with the first-match policy.
pub fn resolve(probe: &[f32], catalog: &[CatalogEntry], threshold: f32) -> MatchOutcome {
    Resolver::new(threshold).resolve(probe, catalog)
}

/// Verdict of a direct one-to-one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairVerdict {
    pub verified: bool,
    pub similarity: f32,
    pub distance: f32,
    pub threshold: f32,
}

/// Compares two embeddings with the same cutoff convention as [`Resolver`].
pub fn verify_pair(a: &[f32], b: &[f32], threshold: f32) -> Result<PairVerdict, FaceIdError> {
    let similarity = cosine_similarity(a, b)?;
    Ok(PairVerdict {
        verified: similarity > 1.0 - threshold,
        similarity,
        distance: 1.0 - similarity,
        threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, v: &[f32]) -> CatalogEntry {
        CatalogEntry::new(key, format!("name-{key}"), v.to_vec())
    }

    #[test]
    fn exact_match_verifies() {
        let catalog = vec![entry("x", &[0.0, 0.0, 1.0]), entry("y", &[0.3, 0.4, 0.5])];
        let out = resolve(&[0.3, 0.4, 0.5], &catalog, DEFAULT_THRESHOLD);
        assert_eq!(out.identity_key(), Some("y"));
        if let MatchOutcome::Verified { name, similarity, .. } = out {
            assert_eq!(name, "name-y");
            assert!((similarity - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn below_cutoff_is_unverified() {
        // Similarities: 0.0, 0.3, -1.0; all <= 0.32.
        let catalog = vec![
            entry("a", &[0.0, 1.0]),
            entry("b", &[0.3, 0.953_939_2]),
            entry("c", &[-1.0, 0.0]),
        ];
        assert_eq!(
            resolve(&[1.0, 0.0], &catalog, DEFAULT_THRESHOLD),
            MatchOutcome::Unverified
        );
    }

    #[test]
    fn first_candidate_wins_over_better_one() {
        // a: 0.6, b: 1.0, both above 0.32. a comes first.
        let catalog = vec![entry("a", &[1.0, 0.0]), entry("b", &[0.6, 0.8])];
        let out = resolve(&[0.6, 0.8], &catalog, DEFAULT_THRESHOLD);
        assert_eq!(out.identity_key(), Some("a"));
    }

    #[test]
    fn best_match_policy_scans_everything() {
        let catalog = vec![entry("a", &[1.0, 0.0]), entry("b", &[0.6, 0.8])];
        let out = Resolver::default()
            .with_policy(MatchPolicy::BestMatch)
            .resolve(&[0.6, 0.8], &catalog);
        assert_eq!(out.identity_key(), Some("b"));
    }

    #[test]
    fn best_match_ties_go_to_earlier_entry() {
        let catalog = vec![entry("a", &[1.0, 0.0]), entry("b", &[2.0, 0.0])];
        let out = Resolver::default()
            .with_policy(MatchPolicy::BestMatch)
            .resolve(&[1.0, 0.0], &catalog);
        assert_eq!(out.identity_key(), Some("a"));
    }

    #[test]
    fn corrupted_entry_does_not_deny_service() {
        let catalog = vec![
            entry("short", &[1.0]),
            entry("zero", &[0.0, 0.0]),
            entry("empty", &[]),
            entry("good", &[1.0, 0.1]),
        ];
        let out = resolve(&[1.0, 0.0], &catalog, DEFAULT_THRESHOLD);
        assert_eq!(out.identity_key(), Some("good"));
    }

    #[test]
    fn non_finite_entry_never_matches() {
        let catalog = vec![
            entry("nan", &[f32::NAN, 0.0]),
            entry("inf", &[0.0, f32::INFINITY]),
            entry("b", &[0.0, 1.0]),
        ];
        let out = resolve(&[0.0, 1.0], &catalog, DEFAULT_THRESHOLD);
        assert_eq!(out.identity_key(), Some("b"));

        let out = resolve(&[1.0, 0.0], &catalog[..2], DEFAULT_THRESHOLD);
        assert_eq!(out, MatchOutcome::Unverified);
    }

    #[test]
    fn overflowing_probe_is_unverified() {
        let probe = [f32::INFINITY, 0.0];
        let catalog = vec![entry("a", &[0.0, 1.0]), entry("b", &[1.0, 0.0])];
        let out = Resolver::new(DEFAULT_THRESHOLD)
            .with_policy(MatchPolicy::BestMatch)
            .resolve(&probe, &catalog);
        assert_eq!(out, MatchOutcome::Unverified);
    }

    #[test]
    fn raising_threshold_loosens_acceptance() {
        // Similarity is 0.0 (orthogonal).
        let catalog = vec![entry("a", &[0.0, 1.0])];
        assert_eq!(resolve(&[1.0, 0.0], &catalog, 0.68), MatchOutcome::Unverified);
        assert!(resolve(&[1.0, 0.0], &catalog, 1.1).is_verified());
    }

    #[test]
    fn extraction_failure_short_circuits() {
        let catalog = vec![entry("a", &[1.0, 0.0])];
        let out = Resolver::default().resolve_extracted(Err(EmbedError::NoFaceDetected), &catalog);
        assert!(matches!(out, MatchOutcome::ExtractionFailed { .. }));
    }

    #[test]
    fn empty_catalog_is_unverified() {
        assert_eq!(resolve(&[1.0, 0.0], &[], DEFAULT_THRESHOLD), MatchOutcome::Unverified);
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let out = MatchOutcome::Verified {
            identity_key: "a".into(),
            name: "A".into(),
            similarity: 1.0,
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["outcome"], "verified");
        assert_eq!(json["identity_key"], "a");
        let json = serde_json::to_value(MatchOutcome::Unverified).unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "unverified"}));
    }

    #[test]
    fn pair_verdict() {
        let v = verify_pair(&[1.0, 0.0], &[0.6, 0.8], DEFAULT_THRESHOLD).unwrap();
        assert!(v.verified);
        assert!((v.similarity - 0.6).abs() < 1e-6);
        assert!((v.distance - 0.4).abs() < 1e-6);

        let v = verify_pair(&[1.0, 0.0], &[0.0, 1.0], DEFAULT_THRESHOLD).unwrap();
        assert!(!v.verified);

        assert!(verify_pair(&[1.0], &[1.0, 0.0], DEFAULT_THRESHOLD).is_err());
    }
}
