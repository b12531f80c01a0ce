//! # redb-backed Document Storage
//!
//! A disk-backed document store using the redb embedded database.
//!
//! Each collection maps to its own table of `u64 -> postcard bytes`. The last
//! allocated id of every collection lives in a shared metadata table, so ids
//! keep increasing across restarts. Every trait call runs in its own
//! transaction:
//! - ACID per call
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)

use super::{Collection, DocumentStore};
use crate::PolicyError;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

const PERSONS: TableDefinition<u64, &[u8]> = TableDefinition::new("persons");
const CONTRACTS: TableDefinition<u64, &[u8]> = TableDefinition::new("contracts");
const RELATIONSHIPS: TableDefinition<u64, &[u8]> = TableDefinition::new("relationships");
const BENEFICIARY_ATTRIBUTES: TableDefinition<u64, &[u8]> =
    TableDefinition::new("beneficiary_attributes");
const DEPENDENT_ATTRIBUTES: TableDefinition<u64, &[u8]> =
    TableDefinition::new("dependent_attributes");

/// Last allocated id per collection, keyed by collection name.
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

fn table(collection: Collection) -> TableDefinition<'static, u64, &'static [u8]> {
    match collection {
        Collection::Persons => PERSONS,
        Collection::Contracts => CONTRACTS,
        Collection::Relationships => RELATIONSHIPS,
        Collection::BeneficiaryAttributes => BENEFICIARY_ATTRIBUTES,
        Collection::DependentAttributes => DEPENDENT_ATTRIBUTES,
    }
}

/// Maps a redb error onto `Persistence` for the named operation.
fn store_err<E: std::fmt::Display>(operation: &'static str) -> impl Fn(E) -> PolicyError {
    move |e| PolicyError::persistence(operation, e)
}

/// A disk-backed document store using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let db = Database::create(path.as_ref()).map_err(store_err("open"))?;

        // Create every table up front so reads never hit a missing table.
        let write_txn = db.begin_write().map_err(store_err("open"))?;
        for collection in Collection::ALL {
            let _ = write_txn
                .open_table(table(collection))
                .map_err(store_err("open"))?;
        }
        let _ = write_txn.open_table(METADATA).map_err(store_err("open"))?;
        write_txn.commit().map_err(store_err("open"))?;

        tracing::debug!(path = %path.as_ref().display(), "document store opened");
        Ok(Self { db })
    }
}

impl DocumentStore for RedbStore {
    fn allocate_id(&mut self, collection: Collection) -> Result<u64, PolicyError> {
        let write_txn = self.db.begin_write().map_err(store_err("allocate_id"))?;
        let next = {
            let mut meta = write_txn
                .open_table(METADATA)
                .map_err(store_err("allocate_id"))?;
            let last = meta
                .get(collection.name())
                .map_err(store_err("allocate_id"))?
                .map(|v| v.value())
                .unwrap_or(0);
            let next = last
                .checked_add(1)
                .ok_or_else(|| PolicyError::persistence("allocate_id", "id space exhausted"))?;
            meta.insert(collection.name(), next)
                .map_err(store_err("allocate_id"))?;
            next
        };
        write_txn.commit().map_err(store_err("allocate_id"))?;
        Ok(next)
    }

    fn get(&self, collection: Collection, id: u64) -> Result<Option<Vec<u8>>, PolicyError> {
        let read_txn = self.db.begin_read().map_err(store_err("get"))?;
        let docs = read_txn
            .open_table(table(collection))
            .map_err(store_err("get"))?;
        let found = docs.get(id).map_err(store_err("get"))?;
        Ok(found.map(|data| data.value().to_vec()))
    }

    fn put(
        &mut self,
        collection: Collection,
        id: u64,
        document: &[u8],
    ) -> Result<(), PolicyError> {
        let write_txn = self.db.begin_write().map_err(store_err("put"))?;
        {
            let mut docs = write_txn
                .open_table(table(collection))
                .map_err(store_err("put"))?;
            docs.insert(id, document).map_err(store_err("put"))?;
        }
        write_txn.commit().map_err(store_err("put"))?;
        Ok(())
    }

    fn delete(&mut self, collection: Collection, id: u64) -> Result<bool, PolicyError> {
        let write_txn = self.db.begin_write().map_err(store_err("delete"))?;
        let existed = {
            let mut docs = write_txn
                .open_table(table(collection))
                .map_err(store_err("delete"))?;
            let removed = docs.remove(id).map_err(store_err("delete"))?;
            removed.is_some()
        };
        write_txn.commit().map_err(store_err("delete"))?;
        Ok(existed)
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(u64, Vec<u8>)>, PolicyError> {
        let read_txn = self.db.begin_read().map_err(store_err("scan"))?;
        let docs = read_txn
            .open_table(table(collection))
            .map_err(store_err("scan"))?;

        let mut entries = Vec::new();
        for entry in docs.iter().map_err(store_err("scan"))? {
            let (key, value) = entry.map_err(store_err("scan"))?;
            entries.push((key.value(), value.value().to_vec()));
        }
        Ok(entries)
    }

    fn count(&self, collection: Collection) -> Result<usize, PolicyError> {
        let read_txn = self.db.begin_read().map_err(store_err("count"))?;
        let docs = read_txn
            .open_table(table(collection))
            .map_err(store_err("count"))?;
        let count = docs.len().map_err(store_err("count"))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn basic_operations() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");

        let id = store.allocate_id(Collection::Persons).expect("id");
        store.put(Collection::Persons, id, b"alice").expect("put");

        assert_eq!(
            store.get(Collection::Persons, id).expect("get"),
            Some(b"alice".to_vec())
        );
        assert_eq!(store.count(Collection::Persons).expect("count"), 1);
        assert_eq!(store.count(Collection::Contracts).expect("count"), 0);
    }

    #[test]
    fn put_overwrites_and_delete_reports() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");

        store.put(Collection::Contracts, 1, b"v1").expect("put");
        store.put(Collection::Contracts, 1, b"v2").expect("put");
        assert_eq!(
            store.get(Collection::Contracts, 1).expect("get"),
            Some(b"v2".to_vec())
        );

        assert!(store.delete(Collection::Contracts, 1).expect("delete"));
        assert!(!store.delete(Collection::Contracts, 1).expect("delete"));
        assert!(store.get(Collection::Contracts, 1).expect("get").is_none());
    }

    #[test]
    fn scan_returns_documents_in_id_order() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");

        for id in [30u64, 10, 20] {
            store
                .put(Collection::Relationships, id, &id.to_le_bytes())
                .expect("put");
        }

        let ids: Vec<u64> = store
            .scan(Collection::Relationships)
            .expect("scan")
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn recovery_ids_and_documents_after_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        let last = {
            let mut store = RedbStore::open(&db_path).expect("open db");
            let a = store.allocate_id(Collection::DependentAttributes).expect("id");
            let b = store.allocate_id(Collection::DependentAttributes).expect("id");
            store
                .put(Collection::DependentAttributes, a, b"first")
                .expect("put");
            store
                .put(Collection::DependentAttributes, b, b"second")
                .expect("put");
            b
        };

        let mut store = RedbStore::open(&db_path).expect("reopen db");
        assert_eq!(store.count(Collection::DependentAttributes).expect("count"), 2);
        assert_eq!(
            store.allocate_id(Collection::DependentAttributes).expect("id"),
            last + 1
        );
        assert_eq!(store.allocate_id(Collection::Persons).expect("id"), 1);
    }
}
