//! Restart tests for `RedbStorage`.
//!
//! These tests verify that account keys and the identity key persist across
//! database close/reopen cycles, simulating device reboots.

use fmdn_accessory::{AccessoryRuntime, LoggingSink, RedbStorage};
use fmdn_core::{ConnectionId, KeyStore, RecordKey, Storage};
use fmdn_crypto::IdentityKey;
use fmdn_harness::{Peer, bench_config, challenge_nonce};
use tempfile::tempdir;

const OWNER_KEY: [u8; 16] = [0x5A; 16];

#[test]
fn key_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("accessory.redb");

    {
        let storage = RedbStorage::open(&db_path).unwrap();
        let mut store = KeyStore::load(storage, 3).unwrap();
        for n in 1..=4u8 {
            store.save([n; 16]);
        }
        // Database dropped
    }

    let storage = RedbStorage::open(&db_path).unwrap();
    let store = KeyStore::load(storage.clone(), 3).unwrap();
    assert_eq!(store.count(), 3);
    assert!(store.owner().is_none());
    assert_eq!(store.recency()[0], 4);
    assert!(storage.get(RecordKey::AccountKeyOrder).unwrap().is_some());
}

#[tokio::test]
async fn provisioned_accessory_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("accessory.redb");
    let eik = IdentityKey::new([0x3C; 32]);
    let conn = ConnectionId(1);

    {
        let storage = RedbStorage::open(&db_path).unwrap();
        let mut runtime = AccessoryRuntime::new(bench_config(), storage, LoggingSink::new()).unwrap();
        runtime.add_account_key(OWNER_KEY);
        let (handle, task) = runtime.spawn(4);

        handle.connect(conn).await.unwrap();
        let challenge = handle.read_challenge(conn).await.unwrap();
        let nonce = challenge_nonce(&challenge).unwrap();
        let frame = Peer::new(OWNER_KEY).set_identity_key(&nonce, &eik, None).unwrap();
        handle.write(conn, frame.into()).await.unwrap();

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    let storage = RedbStorage::open(&db_path).unwrap();
    let runtime = AccessoryRuntime::new(bench_config(), storage, LoggingSink::new()).unwrap();
    let accessory = runtime.accessory();

    assert!(accessory.is_provisioned());
    assert_eq!(accessory.identity().identity_key(), Some(&eik));
    assert!(accessory.identity().eid().is_some());
    assert_eq!(accessory.key_store().count(), 1);
    assert!(accessory.key_store().owner().is_some());
}

#[test]
fn corrupted_identity_record_refuses_startup() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("accessory.redb");

    {
        let storage = RedbStorage::open(&db_path).unwrap();
        storage.put(RecordKey::IdentityKey, &[1, 2, 3]).unwrap();
    }

    let storage = RedbStorage::open(&db_path).unwrap();
    assert!(AccessoryRuntime::new(bench_config(), storage, LoggingSink::new()).is_err());
}
