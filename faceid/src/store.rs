use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::FaceIdError;
use crate::identity::{CatalogEntry, IdentityRecord};

/// Persists identity records and their embedding slots.
///
/// Iteration order is the store's natural order (ascending identity key for
/// the bundled implementations). Implementations must be safe for
/// concurrent use, and [`IdentityStore::set_embedding`] must be atomic per
/// record: a concurrent writer to another slot of the same record must not
/// be lost.
pub trait IdentityStore: Send + Sync {
    /// Returns all records in natural order.
    fn list(&self) -> Result<Vec<IdentityRecord>, FaceIdError>;

    /// Returns one record by key.
    fn get(&self, identity_key: &str) -> Result<Option<IdentityRecord>, FaceIdError>;

    /// Creates or replaces a record.
    fn upsert(&self, record: &IdentityRecord) -> Result<(), FaceIdError>;

    /// Writes one embedding slot of an existing record.
    /// Fails with [`FaceIdError::NotFound`] if the record does not exist.
    fn set_embedding(
        &self,
        identity_key: &str,
        slot: &str,
        embedding: &[f32],
    ) -> Result<(), FaceIdError>;

    /// Returns the number of records.
    fn len(&self) -> Result<usize, FaceIdError> {
        Ok(self.list()?.len())
    }

    /// Returns true if the store holds no records.
    fn is_empty(&self) -> Result<bool, FaceIdError> {
        Ok(self.len()? == 0)
    }

    /// Returns every record with a populated `slot`, in natural order.
    fn catalog(&self, slot: &str) -> Result<Vec<CatalogEntry>, FaceIdError> {
        Ok(self
            .list()?
            .iter()
            .filter_map(|r| r.catalog_entry(slot))
            .collect())
    }
}

impl fmt::Debug for dyn IdentityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityStore {{ ... }}")
    }
}

/// Runs `f` against `store` on tokio's blocking pool.
pub(crate) async fn blocking<T, F>(
    store: &Arc<dyn IdentityStore>,
    f: F,
) -> Result<T, FaceIdError>
where
    T: Send + 'static,
    F: FnOnce(&dyn IdentityStore) -> Result<T, FaceIdError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| FaceIdError::Persistence(format!("store task failed: {e}")))?
}

/// In-memory [`IdentityStore`] implementation.
/// Data is lost on restart. Suitable for testing or ephemeral use.
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, IdentityRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
        }
    }

    /// Creates a store pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = IdentityRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.identity_key.clone(), r))
            .collect();
        Self {
            records: Mutex::new(map),
        }
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, IdentityRecord>>, FaceIdError> {
        self.records
            .lock()
            .map_err(|e| FaceIdError::Persistence(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityStore for MemoryStore {
    fn list(&self) -> Result<Vec<IdentityRecord>, FaceIdError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn get(&self, identity_key: &str) -> Result<Option<IdentityRecord>, FaceIdError> {
        Ok(self.lock()?.get(identity_key).cloned())
    }

    fn upsert(&self, record: &IdentityRecord) -> Result<(), FaceIdError> {
        self.lock()?
            .insert(record.identity_key.clone(), record.clone());
        Ok(())
    }

    fn set_embedding(
        &self,
        identity_key: &str,
        slot: &str,
        embedding: &[f32],
    ) -> Result<(), FaceIdError> {
        let mut records = self.lock()?;
        let record = records
            .get_mut(identity_key)
            .ok_or_else(|| FaceIdError::NotFound(identity_key.to_string()))?;
        record
            .embeddings
            .insert(slot.to_string(), embedding.to_vec());
        Ok(())
    }

    fn len(&self) -> Result<usize, FaceIdError> {
        Ok(self.lock()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_upsert_and_list_in_key_order() {
        let store = MemoryStore::new();
        store.upsert(&IdentityRecord::new("b", "Bea")).unwrap();
        store.upsert(&IdentityRecord::new("a", "Ana")).unwrap();
        assert_eq!(store.len().unwrap(), 2);

        let keys: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.identity_key)
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn memory_store_set_embedding() {
        let store = MemoryStore::with_records([IdentityRecord::new("a", "Ana")]);
        store.set_embedding("a", "default", &[1.0, 2.0]).unwrap();
        store.set_embedding("a", "facenet", &[3.0]).unwrap();

        let r = store.get("a").unwrap().unwrap();
        assert_eq!(r.embedding("default"), Some(&[1.0, 2.0][..]));
        assert_eq!(r.embedding("facenet"), Some(&[3.0][..]));
    }

    #[test]
    fn memory_store_set_embedding_missing_record() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.set_embedding("ghost", "default", &[1.0]),
            Err(FaceIdError::NotFound(_))
        ));
    }

    #[test]
    fn catalog_only_includes_populated_slot() {
        let store = MemoryStore::with_records([
            IdentityRecord::new("a", "Ana").with_embedding("default", vec![1.0, 0.0]),
            IdentityRecord::new("b", "Bea"),
            IdentityRecord::new("c", "Cy").with_embedding("facenet", vec![0.5]),
        ]);
        let catalog = store.catalog("default").unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].identity_key, "a");
        assert_eq!(store.catalog("facenet").unwrap()[0].identity_key, "c");
    }
}
