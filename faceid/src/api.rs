//! Request and response shapes of the verification surface.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::identity::CatalogEntry;
use crate::resolver::MatchOutcome;

/// Input of a verify call. Exactly one of `probe`, `image_url` or `image`
/// must be set. Without `catalog` the store's catalog is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Uploaded image bytes; never part of the JSON body.
    #[serde(skip)]
    pub image: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Vec<CatalogEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
}

impl VerifyRequest {
    pub fn with_probe(probe: Vec<f32>) -> Self {
        Self {
            probe: Some(probe),
            ..Self::default()
        }
    }

    pub fn with_image_url(url: impl Into<String>) -> Self {
        Self {
            image_url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn with_image(image: impl Into<Bytes>) -> Self {
        Self {
            image: Some(image.into()),
            ..Self::default()
        }
    }

    pub fn catalog(mut self, catalog: Vec<CatalogEntry>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeTag {
    Verified,
    Unverified,
    ExtractionFailed,
    InputError,
}

/// Flat response of a verify call. `verified` is always present; the other
/// fields depend on `outcome`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub verified: bool,
    pub outcome: OutcomeTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyResponse {
    pub fn input_error(message: impl Into<String>) -> Self {
        Self {
            verified: false,
            outcome: OutcomeTag::InputError,
            identity_key: None,
            name: None,
            similarity: None,
            error: Some(message.into()),
        }
    }
}

impl From<MatchOutcome> for VerifyResponse {
    fn from(outcome: MatchOutcome) -> Self {
        let mut resp = Self {
            verified: false,
            outcome: OutcomeTag::Unverified,
            identity_key: None,
            name: None,
            similarity: None,
            error: None,
        };
        match outcome {
            MatchOutcome::Verified {
                identity_key,
                name,
                similarity,
            } => {
                resp.verified = true;
                resp.outcome = OutcomeTag::Verified;
                resp.identity_key = Some(identity_key);
                resp.name = Some(name);
                resp.similarity = Some(similarity);
            }
            MatchOutcome::Unverified => {}
            MatchOutcome::ExtractionFailed { reason } => {
                resp.outcome = OutcomeTag::ExtractionFailed;
                resp.error = Some(reason);
            }
        }
        resp
    }
}

/// Body of a pairwise comparison between two image locators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareRequest {
    pub url_a: String,
    pub url_b: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verified_response_shape() {
        let resp = VerifyResponse::from(MatchOutcome::Verified {
            identity_key: "245321733093".into(),
            name: "Harini".into(),
            similarity: 0.9,
        });
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["verified"], true);
        assert_eq!(json["outcome"], "verified");
        assert_eq!(json["identity_key"], "245321733093");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failure_responses_carry_reason() {
        let resp = VerifyResponse::from(MatchOutcome::ExtractionFailed {
            reason: "embed: no face detected".into(),
        });
        assert!(!resp.verified);
        assert_eq!(resp.outcome, OutcomeTag::ExtractionFailed);
        assert_eq!(resp.error.as_deref(), Some("embed: no face detected"));

        let resp = VerifyResponse::input_error("no probe");
        assert_eq!(resp.outcome, OutcomeTag::InputError);
    }

    #[test]
    fn request_parses_snapshot() {
        let req: VerifyRequest = serde_json::from_str(
            r#"{"probe": [1, 0], "catalog": [{"identity_key": "A", "name": "A", "embedding": [1, 0]}], "threshold": 0.5}"#,
        )
        .unwrap();
        assert_eq!(req.probe, Some(vec![1.0, 0.0]));
        assert_eq!(req.catalog.unwrap().len(), 1);
        assert_eq!(req.threshold, Some(0.5));
        assert!(req.image.is_none());
    }
}
