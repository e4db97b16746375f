use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A registered person and their reference embeddings.
///
/// Each model family writes to its own named slot, so vectors from
/// different families never meet in a comparison. An empty vector in a slot
/// is treated the same as an absent slot.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub identity_key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_locator: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub embeddings: BTreeMap<String, Vec<f32>>,
}

impl IdentityRecord {
    pub fn new(identity_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identity_key: identity_key.into(),
            name: name.into(),
            image_locator: None,
            embeddings: BTreeMap::new(),
        }
    }

    pub fn with_image(mut self, locator: impl Into<String>) -> Self {
        self.image_locator = Some(locator.into());
        self
    }

    pub fn with_embedding(mut self, slot: impl Into<String>, embedding: Vec<f32>) -> Self {
        self.embeddings.insert(slot.into(), embedding);
        self
    }

    /// Returns the slot's vector, or None when absent or empty.
    pub fn embedding(&self, slot: &str) -> Option<&[f32]> {
        self.embeddings
            .get(slot)
            .map(Vec::as_slice)
            .filter(|v| !v.is_empty())
    }

    pub fn has_embedding(&self, slot: &str) -> bool {
        self.embedding(slot).is_some()
    }

    /// Returns the image locator if it is non-blank.
    pub fn usable_image(&self) -> Option<&str> {
        self.image_locator
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Projects this record into a catalog entry for `slot`.
    pub fn catalog_entry(&self, slot: &str) -> Option<CatalogEntry> {
        self.embedding(slot).map(|v| CatalogEntry {
            identity_key: self.identity_key.clone(),
            name: self.name.clone(),
            embedding: v.to_vec(),
        })
    }
}

impl fmt::Debug for IdentityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: BTreeMap<&str, usize> = self
            .embeddings
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        f.debug_struct("IdentityRecord")
            .field("identity_key", &self.identity_key)
            .field("name", &self.name)
            .field("image_locator", &self.image_locator)
            .field("slots", &slots)
            .finish()
    }
}

/// One (identity, reference vector) pair the resolver scans.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(alias = "identityKey")]
    pub identity_key: String,
    pub name: String,
    pub embedding: Vec<f32>,
}

impl CatalogEntry {
    pub fn new(
        identity_key: impl Into<String>,
        name: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            identity_key: identity_key.into(),
            name: name.into(),
            embedding,
        }
    }
}

impl fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("identity_key", &self.identity_key)
            .field("name", &self.name)
            .field("embedding_len", &self.embedding.len())
            .finish()
    }
}
