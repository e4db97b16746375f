//! Bulk export and registration import of identity records.
//!
//! The file format is a JSON array of
//! `{identityKey, name, imageLocator, embedding}` objects. An export file
//! also deserializes as a catalog snapshot (`Vec<CatalogEntry>`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FaceIdError;
use crate::identity::IdentityRecord;
use crate::store::IdentityStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub identity_key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_locator: Option<String>,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

/// Counts from an [`import`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
}

/// Returns every record with a populated `slot`, in store order.
pub fn export(store: &dyn IdentityStore, slot: &str) -> Result<Vec<ExportRecord>, FaceIdError> {
    Ok(store
        .list()?
        .into_iter()
        .filter_map(|r| {
            let embedding = r.embedding(slot)?.to_vec();
            Some(ExportRecord {
                identity_key: r.identity_key,
                name: r.name,
                image_locator: r.image_locator,
                embedding,
            })
        })
        .collect())
}

/// Registers identities from `records`.
///
/// Existing records keep their other slots; name and image locator are
/// overwritten. A non-empty `embedding` is stored into `slot`.
pub fn import(
    store: &dyn IdentityStore,
    slot: &str,
    records: &[ExportRecord],
) -> Result<ImportSummary, FaceIdError> {
    // Validate everything first so a bad file writes nothing.
    for rec in records {
        if rec.identity_key.trim().is_empty() {
            return Err(FaceIdError::InvalidInput("record with empty identityKey".into()));
        }
        if rec.embedding.iter().any(|x| !x.is_finite()) {
            return Err(FaceIdError::InvalidInput(format!(
                "record {}: embedding has non-finite components",
                rec.identity_key
            )));
        }
    }

    let mut summary = ImportSummary::default();
    for rec in records {
        let mut record = match store.get(&rec.identity_key)? {
            Some(existing) => {
                summary.updated += 1;
                existing
            }
            None => {
                summary.created += 1;
                IdentityRecord::new(rec.identity_key.clone(), rec.name.clone())
            }
        };
        record.name = rec.name.clone();
        if rec.image_locator.is_some() {
            record.image_locator = rec.image_locator.clone();
        }
        if !rec.embedding.is_empty() {
            record
                .embeddings
                .insert(slot.to_string(), rec.embedding.clone());
        }
        store.upsert(&record)?;
    }
    tracing::info!(created = summary.created, updated = summary.updated, "faceid: import finished");
    Ok(summary)
}

/// Save records to a JSON file.
pub fn save_json(records: &[ExportRecord], path: &Path) -> Result<(), FaceIdError> {
    let data = serde_json::to_string_pretty(records)?;
    std::fs::write(path, data)?;
    Ok(())
}

/// Load records from a JSON file.
pub fn load_json(path: &Path) -> Result<Vec<ExportRecord>, FaceIdError> {
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}
