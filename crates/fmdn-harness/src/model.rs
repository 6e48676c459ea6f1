//! Reference model of the account key store.
//!
//! A plain recency list with none of the real store's slot and id
//! bookkeeping. Operations are applied to both and their observable state
//! (keys ordered by recency, owner) compared.

use std::collections::VecDeque;

use fmdn_core::{KeyStore, Storage};
use fmdn_proto::ACCOUNT_KEY_SIZE;

/// Operation applied to model and real store alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOp {
    /// Save the key derived from this index
    Save(u8),
    /// Look up the key derived from this index
    Find(u8),
    /// Reload the real store from storage
    Restart,
}

/// Key bytes for a small index, so generated operations collide often.
pub fn pool_key(index: u8) -> [u8; ACCOUNT_KEY_SIZE] {
    let mut key = [0u8; ACCOUNT_KEY_SIZE];
    key[0] = index;
    key[ACCOUNT_KEY_SIZE - 1] = 0xA5;
    key
}

/// Least-recently-used list of keys, most recent first.
#[derive(Debug, Clone)]
pub struct KeyStoreModel {
    capacity: usize,
    recency: VecDeque<[u8; ACCOUNT_KEY_SIZE]>,
    owner: Option<[u8; ACCOUNT_KEY_SIZE]>,
}

impl KeyStoreModel {
    /// Empty model.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, recency: VecDeque::new(), owner: None }
    }

    /// Admit a key. Existing keys are left untouched.
    pub fn save(&mut self, key: [u8; ACCOUNT_KEY_SIZE]) {
        if self.recency.contains(&key) {
            return;
        }
        if self.recency.is_empty() {
            self.owner = Some(key);
        }
        if self.recency.len() == self.capacity
            && let Some(evicted) = self.recency.pop_back()
            && self.owner == Some(evicted)
        {
            self.owner = None;
        }
        self.recency.push_front(key);
    }

    /// Mark a key as used. Returns whether it is stored.
    pub fn find(&mut self, key: [u8; ACCOUNT_KEY_SIZE]) -> bool {
        let Some(position) = self.recency.iter().position(|stored| *stored == key) else {
            return false;
        };
        self.recency.remove(position);
        self.recency.push_front(key);
        true
    }

    /// Number of stored keys.
    pub fn count(&self) -> usize {
        self.recency.len()
    }

    /// Keys ordered most recently used first.
    pub fn by_recency(&self) -> Vec<[u8; ACCOUNT_KEY_SIZE]> {
        self.recency.iter().copied().collect()
    }

    /// Owner key, unless it was evicted.
    pub fn owner(&self) -> Option<[u8; ACCOUNT_KEY_SIZE]> {
        self.owner
    }
}

/// Keys of a real store ordered most recently used first.
pub fn store_by_recency<S: Storage>(store: &KeyStore<S>) -> Vec<[u8; ACCOUNT_KEY_SIZE]> {
    store
        .recency()
        .iter()
        .filter_map(|id| store.keys().iter().find(|key| key.id() == *id))
        .map(|key| *key.as_bytes())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recent() {
        let mut model = KeyStoreModel::new(2);
        model.save(pool_key(1));
        model.save(pool_key(2));
        assert!(model.find(pool_key(1)));
        model.save(pool_key(3));

        assert_eq!(model.by_recency(), vec![pool_key(3), pool_key(1)]);
        assert_eq!(model.owner(), Some(pool_key(1)));
    }

    #[test]
    fn evicting_owner_leaves_no_owner() {
        let mut model = KeyStoreModel::new(1);
        model.save(pool_key(1));
        model.save(pool_key(2));
        assert_eq!(model.owner(), None);
        assert_eq!(model.count(), 1);
    }
}
