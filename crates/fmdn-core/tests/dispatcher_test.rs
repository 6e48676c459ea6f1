//! End-to-end command exchanges against a simulated accessory.
//!
//! Each test drives the accessory the way a transport does: connect, read a
//! challenge, write a tagged command, and check the notified response and
//! side effects.

use std::time::Duration;

use fmdn_core::{
    AccessoryAction, AccessoryConfig, AccessoryError, AuthFailure, BatteryLevel, ConnectionId,
    DispatchError, LocalRingEvent, MemoryStorage,
};
use fmdn_crypto::{
    CryptoProvider, IdentityKey, KeyPurpose, ROTATION_PERIOD_SECS, RustCryptoProvider,
    rotation_window,
};
use fmdn_harness::{Bench, IdentityHolder, Peer, bench_config, open_response, signed_command};
use fmdn_proto::{
    EcCurve, ErrorCode, Opcode, ProtocolError,
    payloads::{
        ActivateTrackingProtectionRequest, ProvisioningState, RingComponents, RingRequest,
        RingStateChange, RingStateCode, RingStatus,
    },
};

const OWNER_KEY: [u8; 16] = [0x11; 16];
const OTHER_KEY: [u8; 16] = [0x22; 16];
const CONN: ConnectionId = ConnectionId(1);

fn identity_key(byte: u8) -> IdentityKey {
    IdentityKey::new([byte; 32])
}

fn provisioned_bench(seed: u64) -> (Bench, Peer, IdentityKey) {
    let mut bench = Bench::new(seed).unwrap();
    bench.accessory.add_account_key(OWNER_KEY);
    bench.connect(CONN);

    let peer = Peer::new(OWNER_KEY);
    let eik = identity_key(0xE1);
    let exchange = bench
        .exchange(CONN, |nonce| peer.set_identity_key(nonce, &eik, None).unwrap())
        .unwrap();
    exchange.result.unwrap();

    (bench, peer, eik)
}

fn eid_for(eik: &IdentityKey, clock: u32) -> Vec<u8> {
    RustCryptoProvider::new().compute_eid(EcCurve::Secp256r1, eik, clock).unwrap().eid
}

fn ring_request(components: u8, timeout_ds: u16) -> RingRequest {
    RingRequest { components: RingComponents::from_bits(components), timeout_ds, volume: None }
}

fn advertised_eid(actions: &[AccessoryAction]) -> Option<Vec<u8>> {
    actions.iter().find_map(|action| match action {
        AccessoryAction::UpdateAdvertising { eid, .. } => Some(eid.clone()),
        _ => None,
    })
}

#[test]
fn provisioning_announces_and_advertises() {
    let mut bench = Bench::new(1).unwrap();
    bench.accessory.add_account_key(OWNER_KEY);
    bench.connect(CONN);
    let peer = Peer::new(OWNER_KEY);
    let eik = identity_key(0xE1);

    let exchange = bench
        .exchange(CONN, |nonce| peer.set_identity_key(nonce, &eik, None).unwrap())
        .unwrap();
    let actions = exchange.actions();

    assert!(matches!(actions[0], AccessoryAction::Notify { connection: CONN, .. }));
    assert_eq!(advertised_eid(actions), Some(eid_for(&eik, 0)));
    assert!(actions.contains(&AccessoryAction::ProvisioningChanged { provisioned: true }));
    assert!(bench.accessory.is_provisioned());

    let response = open_response(&OWNER_KEY, &exchange.nonce, &exchange.response_to(CONN).unwrap());
    assert!(response.unwrap().body.is_empty());
}

#[test]
fn read_parameters_response_verifies_under_matched_key() {
    let (mut bench, peer, _) = provisioned_bench(2);
    bench.env.advance(Duration::from_secs(42));

    let exchange = bench.exchange(CONN, |nonce| peer.read_parameters(nonce)).unwrap();
    let frame = exchange.response_to(CONN).unwrap();

    assert!(open_response(&OTHER_KEY, &exchange.nonce, &frame).is_none());
    let response = open_response(&OWNER_KEY, &exchange.nonce, &frame).unwrap();
    let parameters = peer.decrypt_parameters(&response.body).unwrap();

    assert_eq!(parameters.clock, 42);
    assert_eq!(parameters.curve, EcCurve::Secp256r1);
    assert_eq!(parameters.ring_components, 1);
    assert_eq!(parameters.tx_power, -10);
    assert!(exchange.actions().contains(&AccessoryAction::ClockSynced));
}

#[test]
fn replacing_identity_key_changes_reported_identifier() {
    let (mut bench, peer, eik) = provisioned_bench(3);
    let replacement = identity_key(0xE2);

    let exchange = bench
        .exchange(CONN, |nonce| peer.set_identity_key(nonce, &replacement, Some(&eik)).unwrap())
        .unwrap();
    let actions = exchange.result.unwrap();
    assert!(!actions.iter().any(|a| matches!(a, AccessoryAction::ProvisioningChanged { .. })));

    let exchange = bench.exchange(CONN, |nonce| peer.read_provisioning_state(nonce)).unwrap();
    let frame = exchange.response_to(CONN).unwrap();
    let response = open_response(&OWNER_KEY, &exchange.nonce, &frame).unwrap();
    let state = ProvisioningState::decode(&response.body).unwrap();

    assert!(state.provisioned);
    assert!(state.owner);
    assert_eq!(state.eid, Some(eid_for(&replacement, 0)));
    assert_ne!(state.eid, Some(eid_for(&eik, 0)));
}

#[test]
fn replacing_identity_key_requires_current_key_proof() {
    let (mut bench, peer, _) = provisioned_bench(4);
    let wrong_current = identity_key(0x99);

    let exchange = bench
        .exchange(CONN, |nonce| {
            peer.set_identity_key(nonce, &identity_key(0xE2), Some(&wrong_current)).unwrap()
        })
        .unwrap();

    assert_eq!(exchange.result, Err(DispatchError::Unauthenticated(AuthFailure::KeyHashMismatch)));
    assert_eq!(bench.accessory.identity().identity_key(), Some(&identity_key(0xE1)));
}

#[test]
fn set_identity_key_requires_owner_but_bumps_recency_first() {
    let mut bench = Bench::new(5).unwrap();
    bench.accessory.add_account_key(OWNER_KEY);
    let other = bench.accessory.add_account_key(OTHER_KEY);
    bench.connect(CONN);
    let outsider = Peer::new(OTHER_KEY);

    // Make the owner key the most recent first.
    let owner = Peer::new(OWNER_KEY);
    bench.exchange(CONN, |nonce| owner.read_parameters(nonce)).unwrap().result.unwrap();

    let exchange = bench
        .exchange(CONN, |nonce| outsider.set_identity_key(nonce, &identity_key(1), None).unwrap())
        .unwrap();

    assert_eq!(exchange.result, Err(DispatchError::Unauthenticated(AuthFailure::NotOwner)));
    assert_eq!(bench.accessory.key_store().recency()[0], other.id());
    assert!(!bench.accessory.is_provisioned());
}

#[test]
fn unknown_account_key_is_unauthenticated() {
    let (mut bench, _, _) = provisioned_bench(6);
    let stranger = Peer::new([0x77; 16]);

    let exchange = bench.exchange(CONN, |nonce| stranger.read_parameters(nonce)).unwrap();
    let err = exchange.result.unwrap_err();
    assert_eq!(err, DispatchError::Unauthenticated(AuthFailure::TagMismatch));
    assert_eq!(err.code(), ErrorCode::Unauthenticated);
}

#[test]
fn challenge_powers_exactly_one_write() {
    let (mut bench, peer, _) = provisioned_bench(7);

    let nonce = bench.challenge(CONN).unwrap();
    let frame = peer.read_parameters(&nonce);
    assert!(bench.accessory.write_command(CONN, &frame).is_ok());
    assert_eq!(
        bench.accessory.write_command(CONN, &frame),
        Err(DispatchError::Unauthenticated(AuthFailure::NoChallenge))
    );
}

#[test]
fn write_without_challenge_is_rejected() {
    let (mut bench, peer, _) = provisioned_bench(8);
    let frame = peer.read_parameters(&[0; 8]);

    assert_eq!(
        bench.accessory.write_command(CONN, &frame),
        Err(DispatchError::Unauthenticated(AuthFailure::NoChallenge))
    );
}

#[test]
fn failed_write_still_consumes_challenge() {
    let (mut bench, peer, _) = provisioned_bench(9);
    let nonce = bench.challenge(CONN).unwrap();

    assert!(bench.accessory.write_command(CONN, &[0x00]).is_err());
    let frame = peer.read_parameters(&nonce);
    assert_eq!(
        bench.accessory.write_command(CONN, &frame),
        Err(DispatchError::Unauthenticated(AuthFailure::NoChallenge))
    );
}

#[test]
fn malformed_frames_are_invalid_value() {
    let (mut bench, _, _) = provisioned_bench(10);

    let exchange = bench.exchange(CONN, |_| vec![0x00, 5, 1, 2]).unwrap();
    let err = exchange.result.unwrap_err();
    assert!(matches!(err, DispatchError::Protocol(ProtocolError::LengthMismatch { .. })));
    assert_eq!(err.code(), ErrorCode::InvalidValue);

    let exchange = bench.exchange(CONN, |nonce| signed_command(&OWNER_KEY, nonce, Opcode::Ring, &[])).unwrap();
    assert_eq!(exchange.result.unwrap_err().code(), ErrorCode::InvalidValue);

    let exchange = bench.exchange(CONN, |_| vec![0x09, 8, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
    assert_eq!(
        exchange.result,
        Err(DispatchError::Protocol(ProtocolError::UnknownOpcode(0x09)))
    );
}

#[test]
fn challenge_on_unknown_connection_fails() {
    let mut bench = Bench::new(11).unwrap();
    assert_eq!(
        bench.accessory.read_challenge(ConnectionId(9)),
        Err(DispatchError::UnknownConnection(ConnectionId(9)))
    );
}

#[test]
fn ring_beyond_capability_is_unauthenticated_but_stop_is_accepted() {
    let (mut bench, _, eik) = provisioned_bench(12);
    let holder = IdentityHolder::new(eik);

    let exchange =
        bench.exchange(CONN, |nonce| holder.ring(nonce, &ring_request(0b111, 100))).unwrap();
    assert_eq!(
        exchange.result,
        Err(DispatchError::Unauthenticated(AuthFailure::ComponentsExceedCapability))
    );

    let exchange = bench.exchange(CONN, |nonce| holder.ring(nonce, &ring_request(0, 0))).unwrap();
    let frame = exchange.response_to(CONN).unwrap();
    let response =
        open_response(&holder.purpose_key(KeyPurpose::Ring), &exchange.nonce, &frame).unwrap();
    let change = RingStateChange::decode(&response.body).unwrap();
    assert_eq!(change.state, RingStateCode::StoppedByRequest);
}

#[test]
fn ring_starts_reports_status_and_times_out() {
    let (mut bench, _, eik) = provisioned_bench(13);
    let holder = IdentityHolder::new(eik);
    let ring_key = holder.purpose_key(KeyPurpose::Ring);

    let exchange =
        bench.exchange(CONN, |nonce| holder.ring(nonce, &ring_request(0x01, 100))).unwrap();
    let ring_nonce = exchange.nonce;
    assert!(exchange.actions().iter().any(|a| matches!(
        a,
        AccessoryAction::StartSound { timeout, .. } if *timeout == Duration::from_secs(10)
    )));

    bench.env.advance(Duration::from_secs(2));
    let exchange = bench.exchange(CONN, |nonce| holder.read_ring_state(nonce)).unwrap();
    let response =
        open_response(&ring_key, &exchange.nonce, &exchange.response_to(CONN).unwrap()).unwrap();
    let status = RingStatus::decode(&response.body).unwrap();
    assert_eq!(status.components, RingComponents::RIGHT);
    assert_eq!(status.remaining_ds, 80);

    let actions = bench.advance(Duration::from_secs(8));
    assert!(actions.contains(&AccessoryAction::StopSound));

    let notified = actions
        .iter()
        .find_map(|action| match action {
            AccessoryAction::Notify { connection: CONN, frame } => Some(frame.clone()),
            _ => None,
        })
        .unwrap();
    let response = open_response(&ring_key, &ring_nonce, &notified).unwrap();
    assert_eq!(
        RingStateChange::decode(&response.body).unwrap().state,
        RingStateCode::StoppedByTimeout
    );
}

#[test]
fn disconnecting_ring_owner_silences_local_notifications() {
    let (mut bench, _, eik) = provisioned_bench(14);
    let holder = IdentityHolder::new(eik);

    bench.exchange(CONN, |nonce| holder.ring(nonce, &ring_request(0x01, 600))).unwrap().result.unwrap();
    assert!(bench.accessory.disconnect(CONN));
    assert!(bench.accessory.ring().context().is_none());

    let actions = bench.accessory.local_ring(LocalRingEvent::StoppedByButton);
    assert_eq!(actions.len(), 1);
    assert!(matches!(
        actions[0],
        AccessoryAction::RingStateChanged(RingStateChange { state: RingStateCode::StoppedByButton, .. })
    ));
}

#[test]
fn local_ring_change_notifies_ring_owner() {
    let (mut bench, _, eik) = provisioned_bench(15);
    let holder = IdentityHolder::new(eik);

    let exchange =
        bench.exchange(CONN, |nonce| holder.ring(nonce, &ring_request(0x01, 600))).unwrap();
    let actions = bench.accessory.local_ring(LocalRingEvent::StoppedByButton);

    let AccessoryAction::Notify { connection, frame } = &actions[1] else {
        panic!("expected notification, got {actions:?}");
    };
    assert_eq!(*connection, CONN);
    assert!(open_response(&holder.purpose_key(KeyPurpose::Ring), &exchange.nonce, frame).is_some());
}

#[test]
fn clearing_identity_key_releases_ring_context() {
    let (mut bench, peer, eik) = provisioned_bench(16);
    let holder = IdentityHolder::new(eik.clone());
    bench.exchange(CONN, |nonce| holder.ring(nonce, &ring_request(0x01, 600))).unwrap().result.unwrap();

    let exchange = bench.exchange(CONN, |nonce| peer.clear_identity_key(nonce, &eik)).unwrap();
    let actions = exchange.result.unwrap();

    assert!(actions.contains(&AccessoryAction::StopAdvertising));
    assert!(actions.contains(&AccessoryAction::ProvisioningChanged { provisioned: false }));
    assert!(!bench.accessory.is_provisioned());
    assert!(bench.accessory.ring().context().is_none());
}

#[test]
fn clearing_requires_provisioning() {
    let mut bench = Bench::new(17).unwrap();
    bench.accessory.add_account_key(OWNER_KEY);
    bench.connect(CONN);
    let peer = Peer::new(OWNER_KEY);

    let exchange =
        bench.exchange(CONN, |nonce| peer.clear_identity_key(nonce, &identity_key(1))).unwrap();
    assert_eq!(exchange.result, Err(DispatchError::Unauthenticated(AuthFailure::NotProvisioned)));
}

#[test]
fn identity_key_readout_needs_consent() {
    let (mut bench, peer, eik) = provisioned_bench(18);
    let holder = IdentityHolder::new(eik.clone());

    let exchange = bench.exchange(CONN, |nonce| holder.read_identity_key(nonce)).unwrap();
    let err = exchange.result.unwrap_err();
    assert_eq!(err, DispatchError::NoUserConsent);
    assert_eq!(err.code(), ErrorCode::NoUserConsent);

    bench.platform.set_consent(true);
    let exchange = bench.exchange(CONN, |nonce| holder.read_identity_key(nonce)).unwrap();
    let frame = exchange.response_to(CONN).unwrap();
    let response =
        open_response(&holder.purpose_key(KeyPurpose::Recovery), &exchange.nonce, &frame).unwrap();
    assert_eq!(peer.decrypt_identity_key(&response.body), Some(eik));
}

#[test]
fn tracking_protection_forces_new_identifier_in_same_window() {
    let (mut bench, _, eik) = provisioned_bench(19);
    let holder = IdentityHolder::new(eik);
    let before = bench.accessory.identity().eid().unwrap().to_vec();

    let exchange = bench.exchange(CONN, |nonce| holder.activate_utp(nonce, 0)).unwrap();
    let activated = advertised_eid(exchange.actions()).unwrap();
    assert_ne!(activated, before);
    assert!(bench.accessory.identity().utp().is_active());

    let exchange = bench.exchange(CONN, |nonce| holder.deactivate_utp(nonce)).unwrap();
    let deactivated = advertised_eid(exchange.actions()).unwrap();
    assert_ne!(deactivated, activated);
    assert!(!bench.accessory.identity().utp().is_active());
}

#[test]
fn toggling_tracking_protection_keeps_rotation_on_schedule() {
    let (mut bench, _, eik) = provisioned_bench(27);
    let holder = IdentityHolder::new(eik.clone());

    for _ in 0..5 {
        bench.exchange(CONN, |nonce| holder.activate_utp(nonce, 0)).unwrap().result.unwrap();
        bench.exchange(CONN, |nonce| holder.deactivate_utp(nonce)).unwrap().result.unwrap();

        let limit = rotation_window(bench.accessory.clock_secs()) + ROTATION_PERIOD_SECS;
        let window = bench.accessory.identity().current_window().unwrap();
        assert!(window <= limit, "identifier window {window} ran past {limit}");
    }

    for _ in 0..5 {
        let actions = bench.advance(Duration::from_secs(1300));
        let window = rotation_window(bench.accessory.clock_secs());
        assert_eq!(advertised_eid(&actions), Some(eid_for(&eik, window)));
    }
}

#[test]
fn deactivation_requires_current_key_proof() {
    let (mut bench, _, eik) = provisioned_bench(20);
    let holder = IdentityHolder::new(eik);
    bench.exchange(CONN, |nonce| holder.activate_utp(nonce, 0)).unwrap().result.unwrap();

    let utp_key = holder.purpose_key(KeyPurpose::TrackingProtection);
    let exchange = bench
        .exchange(CONN, |nonce| {
            signed_command(&utp_key, nonce, Opcode::DeactivateTrackingProtection, &[0; 8])
        })
        .unwrap();
    assert_eq!(exchange.result, Err(DispatchError::Unauthenticated(AuthFailure::KeyHashMismatch)));
    assert!(bench.accessory.identity().utp().is_active());
}

#[test]
fn skip_ring_auth_accepts_untagged_ring() {
    let (mut bench, _, eik) = provisioned_bench(21);
    let holder = IdentityHolder::new(eik);
    let forged = |nonce: &[u8; 8]| {
        signed_command(&[0; 8], nonce, Opcode::Ring, &ring_request(0x01, 50).encode())
    };

    let exchange = bench.exchange(CONN, forged).unwrap();
    assert_eq!(exchange.result, Err(DispatchError::Unauthenticated(AuthFailure::TagMismatch)));

    bench
        .exchange(CONN, |nonce| {
            holder.activate_utp(nonce, ActivateTrackingProtectionRequest::SKIP_RING_AUTH)
        })
        .unwrap()
        .result
        .unwrap();

    let exchange = bench.exchange(CONN, forged).unwrap();
    assert!(exchange.result.is_ok());
    assert!(bench.accessory.ring().is_ringing());
}

#[test]
fn utp_commands_require_provisioning() {
    let mut bench = Bench::new(22).unwrap();
    bench.connect(CONN);
    let holder = IdentityHolder::new(identity_key(3));

    let exchange = bench.exchange(CONN, |nonce| holder.activate_utp(nonce, 0)).unwrap();
    assert_eq!(exchange.result, Err(DispatchError::Unauthenticated(AuthFailure::NotProvisioned)));
}

#[test]
fn rotation_changes_identifier_once_window_advances() {
    let (mut bench, _, _) = provisioned_bench(23);
    let before = bench.accessory.identity().eid().unwrap().to_vec();

    let actions = bench.advance(Duration::from_secs(500));
    assert_eq!(advertised_eid(&actions), None);

    let mut rotated = None;
    for _ in 0..4 {
        let actions = bench.run_next_deadline();
        if let Some(eid) = advertised_eid(&actions) {
            rotated = Some(eid);
            break;
        }
    }
    let rotated = rotated.unwrap();
    assert_ne!(rotated, before);

    let elapsed = bench.env.elapsed().as_secs();
    assert!((1025..=1228).contains(&elapsed), "rotated after {elapsed}s");
}

#[test]
fn battery_change_republishes_without_rotation() {
    let (mut bench, _, _) = provisioned_bench(24);
    let eid = bench.accessory.identity().eid().unwrap().to_vec();

    bench.platform.set_battery(BatteryLevel::Low);
    let actions = bench.accessory.battery_changed();

    assert_eq!(actions.len(), 1);
    let AccessoryAction::UpdateAdvertising { eid: published, rotate_address, .. } = &actions[0]
    else {
        panic!("expected advertising update");
    };
    assert_eq!(*published, eid);
    assert!(!rotate_address);
}

#[test]
fn restart_restores_keys_and_identity() {
    let (mut bench, peer, eik) = provisioned_bench(25);
    bench.accessory.add_account_key(OTHER_KEY);

    bench.restart().unwrap();
    assert!(bench.accessory.is_provisioned());
    assert_eq!(bench.accessory.key_store().count(), 2);
    assert_eq!(bench.accessory.identity().identity_key(), Some(&eik));

    let actions = bench.advance(Duration::ZERO);
    assert_eq!(advertised_eid(&actions), Some(eid_for(&eik, 0)));

    bench.connect(CONN);
    let exchange = bench.exchange(CONN, |nonce| peer.read_parameters(nonce)).unwrap();
    assert!(exchange.result.is_ok());
}

#[test]
fn restart_reports_identifier_before_first_tick() {
    let (mut bench, peer, eik) = provisioned_bench(28);

    bench.restart().unwrap();
    bench.connect(CONN);
    let exchange = bench.exchange(CONN, |nonce| peer.read_provisioning_state(nonce)).unwrap();
    let frame = exchange.response_to(CONN).unwrap();
    let response = open_response(&OWNER_KEY, &exchange.nonce, &frame).unwrap();
    let state = ProvisioningState::decode(&response.body).unwrap();
    assert_eq!(state.eid, Some(eid_for(&eik, 0)));

    let actions = bench.advance(Duration::ZERO);
    assert_eq!(advertised_eid(&actions), Some(eid_for(&eik, 0)));
    let actions = bench.advance(Duration::ZERO);
    assert_eq!(advertised_eid(&actions), None);
}

#[test]
fn default_curve_is_refused_by_software_provider() {
    let result = Bench::with_storage(AccessoryConfig::default(), MemoryStorage::new(), 29);
    assert!(matches!(result, Err(AccessoryError::InvalidConfig { field: "curve", .. })));

    assert!(Bench::with_storage(bench_config(), MemoryStorage::new(), 29).is_ok());
}

#[test]
fn factory_reset_erases_everything() {
    let (mut bench, _, _) = provisioned_bench(26);

    let actions = bench.accessory.factory_reset();
    assert!(actions.contains(&AccessoryAction::StopAdvertising));
    assert_eq!(bench.accessory.key_store().count(), 0);

    bench.restart().unwrap();
    assert!(!bench.accessory.is_provisioned());
    assert!(bench.accessory.key_store().is_empty());
}
