//! Bounded, persisted account key store with least-recently-used eviction.
//!
//! Keys live in contiguous storage slots `0..count`. Each key carries an id
//! from the cyclic space `1..=2N` (N = capacity) that maps to its slot as
//! `(id - 1) mod N`. When the store is full, a new key takes the slot of the
//! least recently used key with id `lru_id + N` (mod 2N), so the id always
//! changes even though the slot is reused.
//!
//! # Persistence
//!
//! ```text
//! fmdn/ak/{slot}  = id:u8 ‖ flags:u8 (bit0 owner) ‖ key[16]
//! fmdn/ak/order   = id:u8 × count, most recently used first
//! ```
//!
//! In-memory state is authoritative. A failed write is logged and the record
//! is remembered; the next mutation writes it again.
//!
//! # Invariants
//!
//! - No two stored keys have equal key bytes
//! - The recency list is a permutation of the stored ids
//! - At most one key carries the owner flag

use std::{collections::BTreeSet, fmt};

use fmdn_proto::ACCOUNT_KEY_SIZE;
use zeroize::Zeroize;

use crate::{
    error::KeyStoreError,
    storage::{RecordKey, Storage},
};

/// Size of one persisted account key record.
pub const RECORD_SIZE: usize = 2 + ACCOUNT_KEY_SIZE;

const FLAG_OWNER: u8 = 0x01;

/// A 16-byte account key shared with the owner's network.
///
/// `Debug` prints the id and owner flag only. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct AccountKey {
    id: u8,
    owner: bool,
    key: [u8; ACCOUNT_KEY_SIZE],
}

impl AccountKey {
    /// Slot id in `1..=2N`.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// True for the first key admitted into an empty store.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; ACCOUNT_KEY_SIZE] {
        &self.key
    }

    fn slot(&self, capacity: usize) -> usize {
        (usize::from(self.id) - 1) % capacity
    }

    fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut record = [0u8; RECORD_SIZE];
        record[0] = self.id;
        record[1] = if self.owner { FLAG_OWNER } else { 0 };
        record[2..].copy_from_slice(&self.key);
        record
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        let record: &[u8; RECORD_SIZE] = bytes.try_into().ok()?;
        let mut key = [0u8; ACCOUNT_KEY_SIZE];
        key.copy_from_slice(&record[2..]);
        Some(Self { id: record[0], owner: record[1] & FLAG_OWNER != 0, key })
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl Drop for AccountKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Persisted set of account keys ordered by recency.
pub struct KeyStore<S: Storage> {
    storage: S,
    capacity: usize,
    /// Indexed by slot
    keys: Vec<AccountKey>,
    /// Ids, most recently used first
    recency: Vec<u8>,
    /// Records whose last write failed
    dirty: BTreeSet<RecordKey>,
}

impl<S: Storage> KeyStore<S> {
    /// Load and validate every persisted record.
    ///
    /// A recency record that is missing, pruned, oversized or otherwise not
    /// a permutation of the stored ids is rebuilt from slot order and
    /// written back.
    ///
    /// # Errors
    ///
    /// - `KeyStoreError::Corrupted` for a malformed key record, an id that
    ///   does not map to its slot, non-contiguous slots, duplicate key bytes
    ///   or more than one owner
    /// - `KeyStoreError::Storage` if the backend fails to read
    pub fn load(storage: S, capacity: usize) -> Result<Self, KeyStoreError> {
        let keys = load_keys(&storage, capacity)?;
        let stored_order = storage.get(RecordKey::AccountKeyOrder)?;

        let mut store =
            Self { storage, capacity, keys, recency: Vec::new(), dirty: BTreeSet::new() };

        match stored_order {
            Some(order) if store.is_permutation(&order) => store.recency = order,
            None if store.keys.is_empty() => {},
            stored => {
                tracing::warn!(
                    stored_len = stored.as_ref().map(Vec::len),
                    keys = store.keys.len(),
                    "account key order inconsistent, rebuilding from slots"
                );
                store.recency = store.keys.iter().map(AccountKey::id).collect();
                store.write(RecordKey::AccountKeyOrder);
            },
        }

        tracing::debug!(count = store.keys.len(), capacity, "key store loaded");
        Ok(store)
    }

    /// Number of stored keys.
    pub fn count(&self) -> usize {
        self.keys.len()
    }

    /// True if no key is stored.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Maximum number of keys.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stored keys in slot order.
    pub fn keys(&self) -> &[AccountKey] {
        &self.keys
    }

    /// Stored ids, most recently used first.
    pub fn recency(&self) -> &[u8] {
        &self.recency
    }

    /// The owner key, if one is stored.
    pub fn owner(&self) -> Option<&AccountKey> {
        self.keys.iter().find(|key| key.owner)
    }

    /// Number of records waiting to be written again.
    pub fn pending_writes(&self) -> usize {
        self.dirty.len()
    }

    /// Copy every key into `buf` in slot order and return how many were
    /// written.
    ///
    /// # Errors
    ///
    /// - `KeyStoreError::BufferTooSmall` if `buf` is shorter than `count()`
    pub fn get_all(&self, buf: &mut [AccountKey]) -> Result<usize, KeyStoreError> {
        if buf.len() < self.keys.len() {
            return Err(KeyStoreError::BufferTooSmall {
                needed: self.keys.len(),
                available: buf.len(),
            });
        }
        for (dst, key) in buf.iter_mut().zip(&self.keys) {
            dst.clone_from(key);
        }
        Ok(self.keys.len())
    }

    /// First key in slot order matching `predicate`.
    ///
    /// A match becomes the most recently used key and the recency record is
    /// written. A failed write is logged; the in-memory order stands.
    pub fn find(&mut self, mut predicate: impl FnMut(&AccountKey) -> bool) -> Option<AccountKey> {
        let found = self.keys.iter().find(|key| predicate(key))?.clone();

        self.flush_dirty();
        self.touch(found.id);
        self.write(RecordKey::AccountKeyOrder);
        Some(found)
    }

    /// Admit a key. Saving bytes that are already stored is a no-op that
    /// returns the stored key.
    ///
    /// When full, the least recently used key is evicted and its slot
    /// reused. The first key saved into an empty store becomes the owner.
    pub fn save(&mut self, bytes: [u8; ACCOUNT_KEY_SIZE]) -> AccountKey {
        if let Some(existing) = self.keys.iter().find(|key| key.key == bytes) {
            return existing.clone();
        }

        self.flush_dirty();

        let owner = self.keys.is_empty();
        let (id, slot) = match self.recency.last() {
            Some(&lru) if self.keys.len() >= self.capacity => {
                let id = next_cyclic_id(lru, self.capacity);
                let slot = (usize::from(id) - 1) % self.capacity;
                self.recency.retain(|&existing| existing != lru);
                tracing::debug!(evicted = lru, id, slot, "account key store full, evicting");
                (id, slot)
            },
            _ => {
                let slot = self.keys.len();
                (slot as u8 + 1, slot)
            },
        };

        let key = AccountKey { id, owner, key: bytes };
        if slot < self.keys.len() {
            self.keys[slot] = key.clone();
        } else {
            self.keys.push(key.clone());
        }
        self.touch(id);

        self.write(RecordKey::AccountKey { slot: slot as u8 });
        self.write(RecordKey::AccountKeyOrder);

        tracing::info!(id, slot, owner, count = self.keys.len(), "account key saved");
        key
    }

    /// Remove every key and the recency record.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.recency.clear();
        self.dirty.clear();

        for slot in 0..self.capacity {
            self.write(RecordKey::AccountKey { slot: slot as u8 });
        }
        self.write(RecordKey::AccountKeyOrder);
        tracing::info!("account keys cleared");
    }

    fn touch(&mut self, id: u8) {
        self.recency.retain(|&existing| existing != id);
        self.recency.insert(0, id);
    }

    fn is_permutation(&self, order: &[u8]) -> bool {
        if order.len() != self.keys.len() {
            return false;
        }
        let unique: BTreeSet<u8> = order.iter().copied().collect();
        unique.len() == order.len() && self.keys.iter().all(|key| unique.contains(&key.id))
    }

    /// Current in-memory value of a record. `None` means absent.
    fn value_of(&self, record: RecordKey) -> Option<Vec<u8>> {
        match record {
            RecordKey::AccountKey { slot } => {
                self.keys.get(usize::from(slot)).map(|key| key.encode().to_vec())
            },
            RecordKey::AccountKeyOrder if !self.recency.is_empty() => Some(self.recency.clone()),
            _ => None,
        }
    }

    fn write(&mut self, record: RecordKey) {
        let result = match self.value_of(record) {
            Some(value) => self.storage.put(record, &value),
            None => self.storage.delete(record),
        };

        match result {
            Ok(()) => {
                self.dirty.remove(&record);
            },
            Err(e) => {
                tracing::warn!(%record, error = %e, "account key write failed, will retry");
                self.dirty.insert(record);
            },
        }
    }

    fn flush_dirty(&mut self) {
        for record in std::mem::take(&mut self.dirty) {
            self.write(record);
        }
    }
}

/// Id that takes over the slot of `id` in a store of `capacity` keys.
fn next_cyclic_id(id: u8, capacity: usize) -> u8 {
    let space = 2 * capacity;
    ((usize::from(id) - 1 + capacity) % space + 1) as u8
}

fn corrupted(reason: String) -> KeyStoreError {
    KeyStoreError::Corrupted { reason }
}

fn load_keys<S: Storage>(storage: &S, capacity: usize) -> Result<Vec<AccountKey>, KeyStoreError> {
    let mut keys: Vec<AccountKey> = Vec::with_capacity(capacity);
    let mut first_gap = None;

    for slot in 0..capacity {
        let Some(bytes) = storage.get(RecordKey::AccountKey { slot: slot as u8 })? else {
            first_gap.get_or_insert(slot);
            continue;
        };

        if let Some(gap) = first_gap {
            return Err(corrupted(format!("slot {slot} occupied after empty slot {gap}")));
        }

        let key = AccountKey::decode(&bytes)
            .ok_or_else(|| corrupted(format!("slot {slot}: record length {}", bytes.len())))?;

        if key.id == 0 || usize::from(key.id) > 2 * capacity || key.slot(capacity) != slot {
            return Err(corrupted(format!("slot {slot}: id {} does not map here", key.id)));
        }
        if keys.iter().any(|existing| existing.key == key.key) {
            return Err(corrupted(format!("slot {slot}: duplicate key bytes")));
        }
        if key.owner && keys.iter().any(|existing| existing.owner) {
            return Err(corrupted(format!("slot {slot}: second owner key")));
        }

        keys.push(key);
    }

    Ok(keys)
}
