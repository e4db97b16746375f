//! Redb-backed persistent identity store.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::FaceIdError;
use crate::identity::IdentityRecord;
use crate::store::IdentityStore;

/// identity key -> JSON-encoded [`IdentityRecord`].
const IDENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("identities");

fn storage<E: std::fmt::Display>(e: E) -> FaceIdError {
    FaceIdError::Persistence(e.to_string())
}

/// A persistent [`IdentityStore`] backed by redb.
///
/// Every write runs in its own write transaction, so a slot update is a
/// read-modify-write of one record that either commits whole or not at all.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FaceIdError> {
        let db = Database::create(path).map_err(storage)?;

        // Create the table if it doesn't exist.
        let tx = db.begin_write().map_err(storage)?;
        {
            let _ = tx.open_table(IDENTITIES).map_err(storage)?;
        }
        tx.commit().map_err(storage)?;

        Ok(Self { db })
    }
}

impl IdentityStore for RedbStore {
    fn list(&self) -> Result<Vec<IdentityRecord>, FaceIdError> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(IDENTITIES).map_err(storage)?;

        let mut records = Vec::new();
        for item in table.iter().map_err(storage)? {
            let (_, value) = item.map_err(storage)?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    fn get(&self, identity_key: &str) -> Result<Option<IdentityRecord>, FaceIdError> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(IDENTITIES).map_err(storage)?;

        match table.get(identity_key).map_err(storage)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn upsert(&self, record: &IdentityRecord) -> Result<(), FaceIdError> {
        let data = serde_json::to_vec(record)?;
        let tx = self.db.begin_write().map_err(storage)?;
        {
            let mut table = tx.open_table(IDENTITIES).map_err(storage)?;
            table
                .insert(record.identity_key.as_str(), data.as_slice())
                .map_err(storage)?;
        }
        tx.commit().map_err(storage)?;
        Ok(())
    }

    fn set_embedding(
        &self,
        identity_key: &str,
        slot: &str,
        embedding: &[f32],
    ) -> Result<(), FaceIdError> {
        let tx = self.db.begin_write().map_err(storage)?;
        {
            let mut table = tx.open_table(IDENTITIES).map_err(storage)?;
            let current = table
                .get(identity_key)
                .map_err(storage)?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| FaceIdError::NotFound(identity_key.to_string()))?;

            let mut record: IdentityRecord = serde_json::from_slice(&current)?;
            record
                .embeddings
                .insert(slot.to_string(), embedding.to_vec());
            let data = serde_json::to_vec(&record)?;
            table
                .insert(identity_key, data.as_slice())
                .map_err(storage)?;
        }
        tx.commit().map_err(storage)?;
        Ok(())
    }
}
