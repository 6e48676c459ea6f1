//! Fuzz target for the accessory command dispatcher
//!
//! Drives a simulated accessory with an arbitrary mix of transport events,
//! raw and correctly tagged command frames, timer advances and local events.
//!
//! # Invariants
//!
//! - The accessory NEVER panics on any sequence
//! - Every successful write answers the writing connection first
//! - Writes without a fresh challenge are rejected
//! - The key store never exceeds its capacity

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use fmdn_core::{
    AccessoryAction, AuthFailure, BatteryLevel, ConnectionId, DispatchError, LocalRingEvent,
};
use fmdn_crypto::{IdentityKey, KeyPurpose};
use fmdn_harness::{Bench, IdentityHolder, Peer, signed_command};
use fmdn_proto::{NONCE_SIZE, Opcode, RingComponents};
use libfuzzer_sys::fuzz_target;

const OWNER_KEY: [u8; 16] = [0x42; 16];

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    seed: u64,
    eik: [u8; 32],
    operations: Vec<Operation>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Signer {
    Owner,
    Stranger,
    Purpose(u8),
}

#[derive(Debug, Clone, Arbitrary)]
enum Operation {
    Connect(u8),
    Disconnect(u8),
    Challenge(u8),
    WriteRaw { connection: u8, bytes: Vec<u8> },
    WriteSigned { connection: u8, opcode: u8, signer: Signer, additional: Vec<u8> },
    Provision { connection: u8 },
    Advance { secs: u16 },
    LocalRing { kind: u8, components: u8, timeout_ds: u16 },
    Consent(bool),
    Battery(u8),
    AddKey([u8; 16]),
    FactoryReset,
}

fuzz_target!(|scenario: Scenario| {
    let Ok(mut bench) = Bench::new(scenario.seed) else {
        return;
    };
    bench.accessory.add_account_key(OWNER_KEY);
    let eik = IdentityKey::new(scenario.eik);
    let holder = IdentityHolder::new(eik.clone());
    let owner = Peer::new(OWNER_KEY);
    let mut nonces: [Option<[u8; NONCE_SIZE]>; 4] = [None; 4];

    for operation in scenario.operations.into_iter().take(64) {
        match operation {
            Operation::Connect(c) => bench.connect(conn(c)),
            Operation::Disconnect(c) => {
                bench.accessory.disconnect(conn(c));
                nonces[slot(c)] = None;
            },
            Operation::Challenge(c) => nonces[slot(c)] = bench.challenge(conn(c)).ok(),
            Operation::WriteRaw { connection, bytes } => {
                write(&mut bench, connection, &bytes, nonces[slot(connection)].take());
            },
            Operation::WriteSigned { connection, opcode, signer, additional } => {
                let Some(opcode) = Opcode::from_u8(opcode % 9) else {
                    continue;
                };
                let Some(nonce) = nonces[slot(connection)] else {
                    continue;
                };
                let key = match signer {
                    Signer::Owner => OWNER_KEY.to_vec(),
                    Signer::Stranger => vec![0u8; 16],
                    Signer::Purpose(p) => holder.purpose_key(match p % 3 {
                        0 => KeyPurpose::Recovery,
                        1 => KeyPurpose::Ring,
                        _ => KeyPurpose::TrackingProtection,
                    }),
                };
                let additional = &additional[..additional.len().min(200)];
                let frame = signed_command(&key, &nonce, opcode, additional);
                write(&mut bench, connection, &frame, nonces[slot(connection)].take());
            },
            Operation::Provision { connection } => {
                let Some(nonce) = nonces[slot(connection)].take() else {
                    continue;
                };
                let current = bench.accessory.identity().identity_key().cloned();
                if let Ok(frame) = owner.set_identity_key(&nonce, &eik, current.as_ref()) {
                    write(&mut bench, connection, &frame, Some(nonce));
                }
            },
            Operation::Advance { secs } => {
                bench.advance(Duration::from_secs(u64::from(secs)));
            },
            Operation::LocalRing { kind, components, timeout_ds } => {
                let event = match kind % 3 {
                    0 => LocalRingEvent::Started {
                        components: RingComponents::from_bits(components),
                        timeout_ds,
                    },
                    1 => LocalRingEvent::StoppedByButton,
                    _ => LocalRingEvent::Failed,
                };
                bench.accessory.local_ring(event);
            },
            Operation::Consent(granted) => bench.platform.set_consent(granted),
            Operation::Battery(bits) => {
                bench.platform.set_battery(BatteryLevel::from_bits(bits));
                bench.accessory.battery_changed();
            },
            Operation::AddKey(key) => {
                bench.accessory.add_account_key(key);
            },
            Operation::FactoryReset => {
                bench.accessory.factory_reset();
            },
        }

        assert!(bench.accessory.key_store().count() <= bench.accessory.config().max_account_keys);
    }
});

fn conn(c: u8) -> ConnectionId {
    ConnectionId(u64::from(c % 4))
}

fn slot(c: u8) -> usize {
    usize::from(c % 4)
}

fn write(bench: &mut Bench, c: u8, bytes: &[u8], armed: Option<[u8; NONCE_SIZE]>) {
    let result = bench.accessory.write_command(conn(c), bytes);
    match result {
        Ok(actions) => {
            assert!(armed.is_some(), "write accepted without a challenge");
            assert!(matches!(
                actions.first(),
                Some(AccessoryAction::Notify { connection, .. }) if *connection == conn(c)
            ));
        },
        Err(
            DispatchError::Unauthenticated(AuthFailure::NoChallenge)
            | DispatchError::UnknownConnection(_),
        ) => {},
        Err(_) => assert!(armed.is_some(), "non-challenge failure without a challenge"),
    }
}
