//! # Document Storage
//!
//! The schemaless store the policy core runs on.
//!
//! The store knows five logical collections of postcard-encoded documents
//! keyed by generated `u64` ids. It offers single-document atomicity only:
//! there are no foreign keys, joins, or multi-document transactions. Every
//! cross-reference is checked by the layers above, before each write.
//!
//! ## Backends
//!
//! - [`MemoryStore`]: ordered in-memory arena (fast, volatile)
//! - [`RedbStore`]: one redb table per collection (ACID per call, persistent)
//!
//! [`StoreBackend`] selects between the two at runtime.

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::types::{
    BeneficiaryAttributes, Contract, DependentAttributes, PersonRecord, Relationship,
};
use crate::PolicyError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;

// =============================================================================
// COLLECTIONS
// =============================================================================

/// The logical collections of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Persons,
    Contracts,
    Relationships,
    BeneficiaryAttributes,
    DependentAttributes,
}

impl Collection {
    /// Every collection, in a fixed order.
    pub const ALL: [Self; 5] = [
        Self::Persons,
        Self::Contracts,
        Self::Relationships,
        Self::BeneficiaryAttributes,
        Self::DependentAttributes,
    ];

    /// Stable name, used as the redb table name and metadata key.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Persons => "persons",
            Self::Contracts => "contracts",
            Self::Relationships => "relationships",
            Self::BeneficiaryAttributes => "beneficiary_attributes",
            Self::DependentAttributes => "dependent_attributes",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// DOCUMENTSTORE TRAIT
// =============================================================================

/// Raw document storage.
///
/// Each call is atomic on its own; a sequence of calls is not. Scans return
/// documents in ascending id order.
pub trait DocumentStore {
    /// Reserve the next id of a collection. Ids start at 1 and are never reused.
    fn allocate_id(&mut self, collection: Collection) -> Result<u64, PolicyError>;

    /// Read one document.
    fn get(&self, collection: Collection, id: u64) -> Result<Option<Vec<u8>>, PolicyError>;

    /// Insert or overwrite one document.
    fn put(&mut self, collection: Collection, id: u64, document: &[u8])
    -> Result<(), PolicyError>;

    /// Delete one document. Returns whether it existed.
    fn delete(&mut self, collection: Collection, id: u64) -> Result<bool, PolicyError>;

    /// Read every document of a collection.
    fn scan(&self, collection: Collection) -> Result<Vec<(u64, Vec<u8>)>, PolicyError>;

    /// Number of documents in a collection.
    fn count(&self, collection: Collection) -> Result<usize, PolicyError>;
}

// =============================================================================
// TYPED DOCUMENTS
// =============================================================================

/// A typed document living in one collection.
pub trait Document: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    /// The generated id this document is stored under.
    fn key(&self) -> u64;
}

impl Document for PersonRecord {
    const COLLECTION: Collection = Collection::Persons;
    fn key(&self) -> u64 {
        self.id.0
    }
}

impl Document for Contract {
    const COLLECTION: Collection = Collection::Contracts;
    fn key(&self) -> u64 {
        self.id.0
    }
}

impl Document for Relationship {
    const COLLECTION: Collection = Collection::Relationships;
    fn key(&self) -> u64 {
        self.id.0
    }
}

impl Document for BeneficiaryAttributes {
    const COLLECTION: Collection = Collection::BeneficiaryAttributes;
    fn key(&self) -> u64 {
        self.id.0
    }
}

impl Document for DependentAttributes {
    const COLLECTION: Collection = Collection::DependentAttributes;
    fn key(&self) -> u64 {
        self.id.0
    }
}

fn encode<D: Document>(document: &D) -> Result<Vec<u8>, PolicyError> {
    postcard::to_allocvec(document).map_err(|e| PolicyError::Serialization(e.to_string()))
}

fn decode<D: Document>(bytes: &[u8]) -> Result<D, PolicyError> {
    postcard::from_bytes(bytes).map_err(|e| {
        PolicyError::Serialization(format!("{}: {}", D::COLLECTION.name(), e))
    })
}

/// Typed access on top of any [`DocumentStore`].
pub trait DocumentStoreExt: DocumentStore {
    /// Load one document by id.
    fn fetch<D: Document>(&self, id: u64) -> Result<Option<D>, PolicyError> {
        self.get(D::COLLECTION, id)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Store a document under its own key.
    fn persist<D: Document>(&mut self, document: &D) -> Result<(), PolicyError> {
        let bytes = encode(document)?;
        self.put(D::COLLECTION, document.key(), &bytes)
    }

    /// Delete a document by id.
    fn erase<D: Document>(&mut self, id: u64) -> Result<bool, PolicyError> {
        self.delete(D::COLLECTION, id)
    }

    /// Load every document of a collection, in id order.
    fn fetch_all<D: Document>(&self) -> Result<Vec<D>, PolicyError> {
        self.scan(D::COLLECTION)?
            .iter()
            .map(|(_, bytes)| decode(bytes))
            .collect()
    }

    /// Load the documents matching a predicate, in id order.
    ///
    /// This is the store's only query primitive; it stands in for a
    /// `where` clause on a field.
    fn fetch_where<D: Document>(
        &self,
        predicate: impl Fn(&D) -> bool,
    ) -> Result<Vec<D>, PolicyError> {
        let mut matches = Vec::new();
        for (_, bytes) in self.scan(D::COLLECTION)? {
            let document: D = decode(&bytes)?;
            if predicate(&document) {
                matches.push(document);
            }
        }
        Ok(matches)
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

// =============================================================================
// BACKEND SELECTION
// =============================================================================

/// Storage backend chosen at startup.
#[derive(Debug)]
pub enum StoreBackend {
    /// In-memory arena (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StoreBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl StoreBackend {
    /// Open a persistent backend at `path`, or an in-memory one when `None`.
    pub fn open(path: Option<&Path>) -> Result<Self, PolicyError> {
        match path {
            Some(path) => Ok(Self::Persistent(RedbStore::open(path)?)),
            None => Ok(Self::default()),
        }
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }
}

impl DocumentStore for StoreBackend {
    fn allocate_id(&mut self, collection: Collection) -> Result<u64, PolicyError> {
        match self {
            Self::InMemory(store) => store.allocate_id(collection),
            Self::Persistent(store) => store.allocate_id(collection),
        }
    }

    fn get(&self, collection: Collection, id: u64) -> Result<Option<Vec<u8>>, PolicyError> {
        match self {
            Self::InMemory(store) => store.get(collection, id),
            Self::Persistent(store) => store.get(collection, id),
        }
    }

    fn put(
        &mut self,
        collection: Collection,
        id: u64,
        document: &[u8],
    ) -> Result<(), PolicyError> {
        match self {
            Self::InMemory(store) => store.put(collection, id, document),
            Self::Persistent(store) => store.put(collection, id, document),
        }
    }

    fn delete(&mut self, collection: Collection, id: u64) -> Result<bool, PolicyError> {
        match self {
            Self::InMemory(store) => store.delete(collection, id),
            Self::Persistent(store) => store.delete(collection, id),
        }
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(u64, Vec<u8>)>, PolicyError> {
        match self {
            Self::InMemory(store) => store.scan(collection),
            Self::Persistent(store) => store.scan(collection),
        }
    }

    fn count(&self, collection: Collection) -> Result<usize, PolicyError> {
        match self {
            Self::InMemory(store) => store.count(collection),
            Self::Persistent(store) => store.count(collection),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContractNumber, PersonId, RelationshipId, Role};
    use chrono::Utc;

    fn relationship(id: u64, person: u64, contract: &str) -> Relationship {
        Relationship {
            id: RelationshipId(id),
            person_id: PersonId(person),
            contract_number: ContractNumber::new(contract),
            role: Role::Beneficiary,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn typed_round_trip_through_memory_store() {
        let mut store = MemoryStore::new();
        let rel = relationship(1, 7, "CNT-A");

        store.persist(&rel).expect("persist");

        let loaded: Option<Relationship> = store.fetch(1).expect("fetch");
        assert_eq!(loaded, Some(rel));
        assert_eq!(store.count(Collection::Relationships).expect("count"), 1);
        assert_eq!(store.count(Collection::Persons).expect("count"), 0);
    }

    #[test]
    fn fetch_where_filters_in_id_order() {
        let mut store = MemoryStore::new();
        store.persist(&relationship(3, 1, "CNT-B")).expect("persist");
        store.persist(&relationship(1, 1, "CNT-A")).expect("persist");
        store.persist(&relationship(2, 2, "CNT-A")).expect("persist");

        let on_a: Vec<Relationship> = store
            .fetch_where(|r: &Relationship| r.contract_number.as_str() == "CNT-A")
            .expect("query");
        let ids: Vec<u64> = on_a.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn erase_reports_existence() {
        let mut store = MemoryStore::new();
        store.persist(&relationship(1, 1, "CNT-A")).expect("persist");

        assert!(store.erase::<Relationship>(1).expect("erase"));
        assert!(!store.erase::<Relationship>(1).expect("erase"));
        assert!(store.fetch::<Relationship>(1).expect("fetch").is_none());
    }

    #[test]
    fn corrupt_bytes_surface_as_serialization_error() {
        let mut store = MemoryStore::new();
        store
            .put(Collection::Relationships, 1, &[0xFF, 0xFF, 0xFF])
            .expect("put");

        let result = store.fetch::<Relationship>(1);
        assert!(matches!(result, Err(PolicyError::Serialization(_))));
    }

    #[test]
    fn default_backend_is_in_memory() {
        let backend = StoreBackend::open(None).expect("open");
        assert!(!backend.is_persistent());
    }
}
