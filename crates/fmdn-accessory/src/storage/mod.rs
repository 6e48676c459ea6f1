//! Storage backends for the accessory runtime.
//!
//! The core defines the record-level `Storage` seam plus in-memory and
//! fault-injecting implementations; this crate adds the durable backend.

mod redb;

pub use fmdn_core::{ChaoticStorage, MemoryStorage, RecordKey, Storage, StorageError};

pub use self::redb::RedbStorage;
