//! Identity key handling and purpose key derivation.

use std::fmt;

use fmdn_proto::{IDENTITY_KEY_SIZE, KEY_HASH_SIZE, NONCE_SIZE};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Length of a derived purpose key.
pub const PURPOSE_KEY_SIZE: usize = 8;

/// Purpose byte appended to the identity key before hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyPurpose {
    /// Authenticates identity key readout
    Recovery = 0x01,
    /// Authenticates ring commands
    Ring = 0x02,
    /// Authenticates tracking protection mode changes
    TrackingProtection = 0x03,
}

/// The accessory's 32-byte ephemeral identity key.
///
/// Zeroized on drop. `Debug` never prints the key material.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityKey([u8; IDENTITY_KEY_SIZE]);

impl IdentityKey {
    /// Wrap raw key material.
    #[must_use]
    pub fn new(bytes: [u8; IDENTITY_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse from a persisted record. `None` on a length mismatch.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; IDENTITY_KEY_SIZE]>::try_from(bytes).ok().map(Self)
    }

    /// Raw key material.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; IDENTITY_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdentityKey(..)")
    }
}

impl Drop for IdentityKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// An 8-byte key scoped to one [`KeyPurpose`].
#[derive(Clone, PartialEq, Eq)]
pub struct PurposeKey([u8; PURPOSE_KEY_SIZE]);

impl PurposeKey {
    /// Raw key material, used directly as an HMAC key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PURPOSE_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for PurposeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PurposeKey(..)")
    }
}

impl Drop for PurposeKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Derive a purpose key: `SHA256(EIK ‖ purpose)[0:8]`.
///
/// # Security
///
/// - Distinct purposes yield independent keys, so a peer holding the ring
///   key cannot authenticate a tracking protection change
/// - Deterministic: the owner's network derives the same keys
pub fn derive_purpose_key(identity_key: &IdentityKey, purpose: KeyPurpose) -> PurposeKey {
    let mut hasher = Sha256::new();
    hasher.update(identity_key.as_bytes());
    hasher.update([purpose as u8]);
    let digest = hasher.finalize();

    let mut key = [0u8; PURPOSE_KEY_SIZE];
    key.copy_from_slice(&digest[..PURPOSE_KEY_SIZE]);
    PurposeKey(key)
}

/// Proof of knowledge of the current identity key:
/// `SHA256(EIK ‖ nonce)[0:8]`.
pub fn current_key_hash(
    identity_key: &IdentityKey,
    nonce: &[u8; NONCE_SIZE],
) -> [u8; KEY_HASH_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(identity_key.as_bytes());
    hasher.update(nonce);
    let digest = hasher.finalize();

    let mut hash = [0u8; KEY_HASH_SIZE];
    hash.copy_from_slice(&digest[..KEY_HASH_SIZE]);
    hash
}

/// Check a peer-supplied current-key hash in constant time.
pub fn verify_current_key_hash(
    identity_key: &IdentityKey,
    nonce: &[u8; NONCE_SIZE],
    candidate: &[u8; KEY_HASH_SIZE],
) -> bool {
    let expected = current_key_hash(identity_key, nonce);
    expected[..].ct_eq(&candidate[..]).into()
}
