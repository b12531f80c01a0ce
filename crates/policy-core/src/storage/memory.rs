//! In-memory document store.
//!
//! Ordered maps keep scans deterministic. Nothing survives a restart.

use super::{Collection, DocumentStore};
use crate::PolicyError;
use std::collections::BTreeMap;

/// Volatile document store backed by ordered maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: BTreeMap<Collection, BTreeMap<u64, Vec<u8>>>,
    last_ids: BTreeMap<Collection, u64>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn allocate_id(&mut self, collection: Collection) -> Result<u64, PolicyError> {
        let last = self.last_ids.entry(collection).or_insert(0);
        *last = last
            .checked_add(1)
            .ok_or_else(|| PolicyError::persistence("allocate_id", "id space exhausted"))?;
        Ok(*last)
    }

    fn get(&self, collection: Collection, id: u64) -> Result<Option<Vec<u8>>, PolicyError> {
        Ok(self
            .documents
            .get(&collection)
            .and_then(|docs| docs.get(&id))
            .cloned())
    }

    fn put(
        &mut self,
        collection: Collection,
        id: u64,
        document: &[u8],
    ) -> Result<(), PolicyError> {
        self.documents
            .entry(collection)
            .or_default()
            .insert(id, document.to_vec());
        Ok(())
    }

    fn delete(&mut self, collection: Collection, id: u64) -> Result<bool, PolicyError> {
        Ok(self
            .documents
            .get_mut(&collection)
            .is_some_and(|docs| docs.remove(&id).is_some()))
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(u64, Vec<u8>)>, PolicyError> {
        Ok(self
            .documents
            .get(&collection)
            .map(|docs| docs.iter().map(|(id, doc)| (*id, doc.clone())).collect())
            .unwrap_or_default())
    }

    fn count(&self, collection: Collection) -> Result<usize, PolicyError> {
        Ok(self.documents.get(&collection).map_or(0, BTreeMap::len))
    }
}
