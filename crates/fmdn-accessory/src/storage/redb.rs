//! Redb-backed durable storage implementation.
//!
//! Each record is written in its own ACID transaction, so a crash leaves
//! either the previous or the new value, never a torn record.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTableMetadata, TableDefinition};

use super::{RecordKey, Storage, StorageError};

/// Table: records
/// Key: record path (e.g. `fmdn/ak/0`, `fmdn/eik`)
/// Value: raw record bytes
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(RECORDS).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        tracing::debug!(path = %path.as_ref().display(), "record database opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the table cannot be read.
    pub fn len(&self) -> Result<u64, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(RECORDS).map_err(io)?;
        table.len().map_err(io)
    }

    /// True if no record is stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the table cannot be read.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl Storage for RedbStorage {
    fn get(&self, key: RecordKey) -> Result<Option<Vec<u8>>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(RECORDS).map_err(io)?;

        let path = key.path();
        let value = table.get(path.as_str()).map_err(io)?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    fn put(&self, key: RecordKey, value: &[u8]) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(RECORDS).map_err(io)?;
            let path = key.path();
            table.insert(path.as_str(), value).map_err(io)?;
        }
        txn.commit().map_err(io)?;
        Ok(())
    }

    fn delete(&self, key: RecordKey) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(RECORDS).map_err(io)?;
            let path = key.path();
            table.remove(path.as_str()).map_err(io)?;
        }
        txn.commit().map_err(io)?;
        Ok(())
    }
}

fn io(err: impl std::fmt::Display) -> StorageError {
    StorageError::Io(err.to_string())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn put_get_delete() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("records.redb")).unwrap();

        assert_eq!(storage.get(RecordKey::IdentityKey).unwrap(), None);
        storage.put(RecordKey::IdentityKey, &[7; 32]).unwrap();
        assert_eq!(storage.get(RecordKey::IdentityKey).unwrap(), Some(vec![7; 32]));
        assert_eq!(storage.len().unwrap(), 1);

        storage.delete(RecordKey::IdentityKey).unwrap();
        storage.delete(RecordKey::IdentityKey).unwrap();
        assert_eq!(storage.get(RecordKey::IdentityKey).unwrap(), None);
        assert!(storage.is_empty().unwrap());
    }

    #[test]
    fn records_do_not_alias() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("records.redb")).unwrap();

        storage.put(RecordKey::AccountKey { slot: 1 }, &[1]).unwrap();
        storage.put(RecordKey::AccountKey { slot: 10 }, &[10]).unwrap();
        assert_eq!(storage.get(RecordKey::AccountKey { slot: 1 }).unwrap(), Some(vec![1]));
        assert_eq!(storage.get(RecordKey::AccountKey { slot: 10 }).unwrap(), Some(vec![10]));
    }
}
