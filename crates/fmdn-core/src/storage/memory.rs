#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use super::{RecordKey, Storage, StorageError};

/// In-memory storage implementation for testing and simulation
///
/// All state is wrapped in Arc<Mutex<>> so clones share records. Uses
/// `lock().expect()` which will panic if the mutex is poisoned - acceptable
/// for test code.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    records: Arc<Mutex<HashMap<RecordKey, Vec<u8>>>>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[allow(clippy::expect_used)]
    pub fn record_count(&self) -> usize {
        self.records.lock().expect("Mutex poisoned").len()
    }

    /// Overwrite a record without going through the trait (corruption tests).
    #[allow(clippy::expect_used)]
    pub fn insert_raw(&self, key: RecordKey, value: Vec<u8>) {
        self.records.lock().expect("Mutex poisoned").insert(key, value);
    }
}

impl Storage for MemoryStorage {
    #[allow(clippy::expect_used)]
    fn get(&self, key: RecordKey) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.records.lock().expect("Mutex poisoned").get(&key).cloned())
    }

    #[allow(clippy::expect_used)]
    fn put(&self, key: RecordKey, value: &[u8]) -> Result<(), StorageError> {
        self.records.lock().expect("Mutex poisoned").insert(key, value.to_vec());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn delete(&self, key: RecordKey) -> Result<(), StorageError> {
        self.records.lock().expect("Mutex poisoned").remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get(RecordKey::IdentityKey).unwrap(), None);

        storage.put(RecordKey::IdentityKey, &[1, 2, 3]).unwrap();
        assert_eq!(storage.get(RecordKey::IdentityKey).unwrap(), Some(vec![1, 2, 3]));

        storage.delete(RecordKey::IdentityKey).unwrap();
        storage.delete(RecordKey::IdentityKey).unwrap();
        assert_eq!(storage.get(RecordKey::IdentityKey).unwrap(), None);
    }

    #[test]
    fn clones_share_records() {
        let a = MemoryStorage::new();
        let b = a.clone();
        a.put(RecordKey::ClockCheckpoint, &[0, 0, 0, 1]).unwrap();
        assert_eq!(b.get(RecordKey::ClockCheckpoint).unwrap(), Some(vec![0, 0, 0, 1]));
        assert_eq!(b.record_count(), 1);
    }
}
