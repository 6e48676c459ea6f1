//! Model-based property tests for the account key store.
//!
//! proptest generates operation sequences, applies them to the reference
//! model and the real store, and compares keys by recency and the owner
//! after every step.
//!
//! ```text
//! proptest generates: Vec<KeyOp>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!     KeyStoreModel    KeyStore       Compare
//!      (reference)   (MemoryStorage)  by recency, owner
//! ```

use fmdn_core::{KeyStore, MemoryStorage};
use fmdn_harness::{KeyOp, KeyStoreModel, pool_key, store_by_recency};
use proptest::prelude::*;

/// Indices drawn from a pool a little larger than the capacity so saves
/// both collide and evict.
fn key_op(pool: u8) -> impl Strategy<Value = KeyOp> {
    prop_oneof![
        4 => (0..pool).prop_map(KeyOp::Save),
        3 => (0..pool).prop_map(KeyOp::Find),
        1 => Just(KeyOp::Restart),
    ]
}

fn scenario() -> impl Strategy<Value = (usize, Vec<KeyOp>)> {
    (1usize..=10).prop_flat_map(|capacity| {
        let pool = (capacity as u8) * 2;
        (Just(capacity), prop::collection::vec(key_op(pool), 1..80))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn store_matches_model((capacity, ops) in scenario()) {
        let storage = MemoryStorage::new();
        let mut store = KeyStore::load(storage.clone(), capacity).unwrap();
        let mut model = KeyStoreModel::new(capacity);

        for op in ops {
            match op {
                KeyOp::Save(index) => {
                    let key = pool_key(index);
                    let saved = store.save(key);
                    model.save(key);
                    prop_assert_eq!(saved.as_bytes(), &key);
                },
                KeyOp::Find(index) => {
                    let key = pool_key(index);
                    let found = store.find(|stored| stored.as_bytes() == &key);
                    prop_assert_eq!(found.is_some(), model.find(key));
                },
                KeyOp::Restart => {
                    store = KeyStore::load(storage.clone(), capacity).unwrap();
                },
            }

            prop_assert_eq!(store.count(), model.count());
            prop_assert!(store.count() <= capacity);
            prop_assert_eq!(store_by_recency(&store), model.by_recency());
            prop_assert_eq!(store.owner().map(|key| *key.as_bytes()), model.owner());
            prop_assert_eq!(store.pending_writes(), 0);
        }
    }

    #[test]
    fn ids_stay_in_range_and_map_to_their_slots((capacity, ops) in scenario()) {
        let mut store = KeyStore::load(MemoryStorage::new(), capacity).unwrap();

        for op in ops {
            if let KeyOp::Save(index) = op {
                store.save(pool_key(index));
            }
        }

        for (slot, key) in store.keys().iter().enumerate() {
            prop_assert!((1..=2 * capacity).contains(&usize::from(key.id())));
            prop_assert_eq!((usize::from(key.id()) - 1) % capacity, slot);
        }
        let mut ids: Vec<u8> = store.recency().to_vec();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), store.count());
    }
}

#[test]
fn eviction_reuses_slot_with_cyclic_id() {
    let mut store = KeyStore::load(MemoryStorage::new(), 2).unwrap();
    store.save(pool_key(1));
    store.save(pool_key(2));

    let third = store.save(pool_key(3));
    assert_eq!(third.id(), 3);
    assert!(!third.is_owner());
    assert!(store.owner().is_none());

    let fourth = store.save(pool_key(4));
    assert_eq!(fourth.id(), 4);
    let fifth = store.save(pool_key(5));
    assert_eq!(fifth.id(), 1);
}
