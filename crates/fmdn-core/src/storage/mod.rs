//! Storage abstraction for persisted accessory records.
//!
//! A small synchronous key-value seam. The accessory persists four kinds of
//! record: one per occupied account key slot, the account key recency order,
//! the identity key, and the beacon clock checkpoint.

mod chaotic;
mod error;
mod memory;

use std::fmt;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;

/// Key of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    /// Account key stored in `slot` (0-based)
    AccountKey {
        /// Storage slot, `(id - 1) mod capacity`
        slot: u8,
    },
    /// Account key ids ordered most recently used first
    AccountKeyOrder,
    /// The 32-byte ephemeral identity key
    IdentityKey,
    /// Last persisted beacon clock value
    ClockCheckpoint,
}

impl RecordKey {
    /// Stable textual path, used as the key by byte-oriented backends.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::AccountKey { slot } => format!("fmdn/ak/{slot}"),
            Self::AccountKeyOrder => "fmdn/ak/order".to_string(),
            Self::IdentityKey => "fmdn/eik".to_string(),
            Self::ClockCheckpoint => "fmdn/clock".to_string(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Key-value storage for accessory records.
///
/// Must be Clone (each engine holds its own handle), Send + Sync, and
/// synchronous. Implementations share internal state via Arc, so clones
/// access the same underlying storage.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned. Acceptable for test/simulation code only.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Load a record. `None` if it was never written or was deleted.
    fn get(&self, key: RecordKey) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write a record, replacing any previous value.
    ///
    /// # Invariants
    ///
    /// - Post: on `Ok`, a following `get` returns exactly `value`
    /// - On `Err`, the previous value (or absence) is unchanged
    fn put(&self, key: RecordKey, value: &[u8]) -> Result<(), StorageError>;

    /// Delete a record. Deleting an absent record succeeds.
    fn delete(&self, key: RecordKey) -> Result<(), StorageError>;
}
