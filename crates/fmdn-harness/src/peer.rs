//! Simulated peer (the owner's phone or a bystander's device).
//!
//! Builds tagged command frames the way a real peer does and verifies the
//! accessory's tagged responses.

use fmdn_core::auth::verify_response;
use fmdn_crypto::{
    CryptoError, CryptoProvider, IdentityKey, KeyPurpose, RustCryptoProvider, TagDirection,
    TagInput, compute_tag, current_key_hash, derive_purpose_key,
};
use fmdn_proto::{
    ACCOUNT_KEY_SIZE, AUTH_TAG_SIZE, Challenge, NONCE_SIZE, Opcode, ResponseFrame,
    payloads::{
        ActivateTrackingProtectionRequest, BeaconParameters, ClearIdentityKeyRequest,
        DeactivateTrackingProtectionRequest, RingRequest, SetIdentityKeyRequest,
    },
};

/// Encode `opcode ‖ len ‖ tag ‖ additional` with a request tag under `key`.
pub fn signed_command(
    key: &[u8],
    nonce: &[u8; NONCE_SIZE],
    opcode: Opcode,
    additional: &[u8],
) -> Vec<u8> {
    let data_len = (AUTH_TAG_SIZE + additional.len()) as u8;
    let input = TagInput { nonce, opcode: opcode.to_u8(), data_len, additional };
    let tag = compute_tag(key, &input, TagDirection::Request);

    let mut frame = vec![opcode.to_u8(), data_len];
    frame.extend_from_slice(&tag);
    frame.extend_from_slice(additional);
    frame
}

/// Nonce carried by an encoded challenge.
pub fn challenge_nonce(bytes: &[u8]) -> Option<[u8; NONCE_SIZE]> {
    Challenge::decode(bytes).ok().map(|challenge| challenge.nonce)
}

/// Decode a notified response and check its tag under `key`.
pub fn open_response(key: &[u8], nonce: &[u8; NONCE_SIZE], bytes: &[u8]) -> Option<ResponseFrame> {
    let frame = ResponseFrame::decode(bytes).ok()?;
    verify_response(key, nonce, &frame).then_some(frame)
}

/// A peer holding one account key, and optionally the identity key.
#[derive(Debug, Clone)]
pub struct Peer {
    account_key: [u8; ACCOUNT_KEY_SIZE],
    crypto: RustCryptoProvider,
}

impl Peer {
    /// Peer authenticating with `account_key`.
    pub fn new(account_key: [u8; ACCOUNT_KEY_SIZE]) -> Self {
        Self { account_key, crypto: RustCryptoProvider::new() }
    }

    /// The peer's account key.
    pub fn account_key(&self) -> &[u8; ACCOUNT_KEY_SIZE] {
        &self.account_key
    }

    /// `ReadParameters` under the account key.
    pub fn read_parameters(&self, nonce: &[u8; NONCE_SIZE]) -> Vec<u8> {
        signed_command(&self.account_key, nonce, Opcode::ReadParameters, &[])
    }

    /// `ReadProvisioningState` under the account key.
    pub fn read_provisioning_state(&self, nonce: &[u8; NONCE_SIZE]) -> Vec<u8> {
        signed_command(&self.account_key, nonce, Opcode::ReadProvisioningState, &[])
    }

    /// `SetIdentityKey` installing `new`, proving `current` when replacing.
    pub fn set_identity_key(
        &self,
        nonce: &[u8; NONCE_SIZE],
        new: &IdentityKey,
        current: Option<&IdentityKey>,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut encrypted_key = *new.as_bytes();
        self.crypto.aes128_ecb_encrypt(&self.account_key, &mut encrypted_key)?;
        let request = SetIdentityKeyRequest {
            encrypted_key,
            current_key_hash: current.map(|key| current_key_hash(key, nonce)),
        };
        Ok(signed_command(&self.account_key, nonce, Opcode::SetIdentityKey, &request.encode()))
    }

    /// `ClearIdentityKey` proving `current`.
    pub fn clear_identity_key(&self, nonce: &[u8; NONCE_SIZE], current: &IdentityKey) -> Vec<u8> {
        let request = ClearIdentityKeyRequest { current_key_hash: current_key_hash(current, nonce) };
        signed_command(&self.account_key, nonce, Opcode::ClearIdentityKey, &request.encode())
    }

    /// Decrypt a `ReadParameters` body.
    pub fn decrypt_parameters(&self, body: &[u8]) -> Option<BeaconParameters> {
        let mut block: [u8; BeaconParameters::SIZE] = body.try_into().ok()?;
        self.crypto.aes128_ecb_decrypt(&self.account_key, &mut block).ok()?;
        BeaconParameters::from_block(&block).ok()
    }

    /// Decrypt a `ReadIdentityKey` body, assuming this peer holds the owner
    /// key.
    pub fn decrypt_identity_key(&self, body: &[u8]) -> Option<IdentityKey> {
        let mut bytes: [u8; 32] = body.try_into().ok()?;
        self.crypto.aes128_ecb_decrypt(&self.account_key, &mut bytes).ok()?;
        Some(IdentityKey::new(bytes))
    }
}

/// Commands authenticated with purpose keys, available to anyone holding
/// the identity key.
#[derive(Debug, Clone)]
pub struct IdentityHolder {
    identity_key: IdentityKey,
}

impl IdentityHolder {
    /// Holder of `identity_key`.
    pub fn new(identity_key: IdentityKey) -> Self {
        Self { identity_key }
    }

    /// Purpose key bytes for response verification.
    pub fn purpose_key(&self, purpose: KeyPurpose) -> Vec<u8> {
        derive_purpose_key(&self.identity_key, purpose).as_bytes().to_vec()
    }

    /// `ReadIdentityKey` under the recovery key.
    pub fn read_identity_key(&self, nonce: &[u8; NONCE_SIZE]) -> Vec<u8> {
        signed_command(&self.purpose_key(KeyPurpose::Recovery), nonce, Opcode::ReadIdentityKey, &[])
    }

    /// `Ring` under the ring key.
    pub fn ring(&self, nonce: &[u8; NONCE_SIZE], request: &RingRequest) -> Vec<u8> {
        signed_command(&self.purpose_key(KeyPurpose::Ring), nonce, Opcode::Ring, &request.encode())
    }

    /// `ReadRingState` under the ring key.
    pub fn read_ring_state(&self, nonce: &[u8; NONCE_SIZE]) -> Vec<u8> {
        signed_command(&self.purpose_key(KeyPurpose::Ring), nonce, Opcode::ReadRingState, &[])
    }

    /// `ActivateTrackingProtection` under the tracking protection key.
    pub fn activate_utp(&self, nonce: &[u8; NONCE_SIZE], control_flags: u8) -> Vec<u8> {
        let request = ActivateTrackingProtectionRequest { control_flags };
        signed_command(
            &self.purpose_key(KeyPurpose::TrackingProtection),
            nonce,
            Opcode::ActivateTrackingProtection,
            &request.encode(),
        )
    }

    /// `DeactivateTrackingProtection` under the tracking protection key,
    /// proving the identity key.
    pub fn deactivate_utp(&self, nonce: &[u8; NONCE_SIZE]) -> Vec<u8> {
        let request = DeactivateTrackingProtectionRequest {
            current_key_hash: current_key_hash(&self.identity_key, nonce),
        };
        signed_command(
            &self.purpose_key(KeyPurpose::TrackingProtection),
            nonce,
            Opcode::DeactivateTrackingProtection,
            &request.encode(),
        )
    }
}
