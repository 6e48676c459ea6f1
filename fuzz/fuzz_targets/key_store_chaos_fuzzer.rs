//! Fuzz target for the account key store under storage failures
//!
//! Applies arbitrary saves, lookups and restarts to a `KeyStore` over
//! `ChaoticStorage` and to the reference model.
//!
//! # Invariants
//!
//! - The store NEVER panics on storage errors
//! - In-memory state matches the model regardless of failed writes
//! - Once writes succeed again, a reload observes exactly the in-memory state
//! - A reload either succeeds or reports corruption; it never panics

#![no_main]

use arbitrary::Arbitrary;
use fmdn_core::{ChaoticStorage, KeyStore, MemoryStorage};
use fmdn_harness::{KeyStoreModel, pool_key, store_by_recency};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    chaos_seed: u64,
    /// 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    capacity: u8,
    operations: Vec<(bool, u8)>,
}

fuzz_target!(|scenario: Scenario| {
    let capacity = usize::from(scenario.capacity % 10) + 1;
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;
    let inner = MemoryStorage::new();
    let storage = ChaoticStorage::with_seed(inner.clone(), failure_rate, scenario.chaos_seed);

    let Ok(mut store) = KeyStore::load(storage.clone(), capacity) else {
        return;
    };
    let mut model = KeyStoreModel::new(capacity);

    for (save, index) in scenario.operations.into_iter().take(128) {
        let key = pool_key(index % 16);
        if save {
            store.save(key);
            model.save(key);
        } else {
            let found = store.find(|stored| stored.as_bytes() == &key).is_some();
            assert_eq!(found, model.find(key));
        }
        assert_eq!(store_by_recency(&store), model.by_recency());
        assert_eq!(store.owner().map(|key| *key.as_bytes()), model.owner());
    }

    // Whatever reached the backend must reload cleanly
    match KeyStore::load(inner, capacity) {
        Ok(reloaded) if failure_rate == 0.0 => {
            assert_eq!(store_by_recency(&reloaded), store_by_recency(&store));
        },
        Ok(reloaded) => assert!(reloaded.count() <= capacity),
        Err(e) => assert!(failure_rate > 0.0, "healthy storage failed to reload: {e}"),
    }
});
