//! Ephemeral identifier derivation inputs.
//!
//! The identifier itself comes from [`crate::CryptoProvider::reduce_to_curve`]
//! applied to `AES-256-ECB(EIK, eid_seed(clock))`. This module holds the
//! pure parts: window arithmetic, the seed layout and the flags mask.

use sha2::{Digest, Sha256};

/// Rotation period is `2^ROTATION_PERIOD_EXPONENT` seconds (1024 s).
pub const ROTATION_PERIOD_EXPONENT: u8 = 10;

/// Length of one rotation window in seconds.
pub const ROTATION_PERIOD_SECS: u32 = 1 << ROTATION_PERIOD_EXPONENT;

/// Size of the seed block fed to AES-256.
pub const EID_SEED_SIZE: usize = 32;

const PAD_LEN: usize = 11;

/// Clock value with the low rotation-exponent bits cleared.
#[must_use]
pub fn rotation_window(clock: u32) -> u32 {
    clock & !(ROTATION_PERIOD_SECS - 1)
}

/// Two 16-byte halves, each `pad(11) ‖ K ‖ window(BE u32)`, the first padded
/// with `0xFF` and the second with `0x00`.
#[must_use]
pub fn eid_seed(clock: u32) -> [u8; EID_SEED_SIZE] {
    let window = rotation_window(clock).to_be_bytes();
    let mut seed = [0u8; EID_SEED_SIZE];

    let (high, low) = seed.split_at_mut(EID_SEED_SIZE / 2);
    high[..PAD_LEN].fill(0xFF);
    for half in [high, low] {
        half[PAD_LEN] = ROTATION_PERIOD_EXPONENT;
        half[PAD_LEN + 1..].copy_from_slice(&window);
    }
    seed
}

/// XOR mask for the hashed flags advertising byte: last byte of
/// `SHA256(r)` where `r` is the reduced scalar.
#[must_use]
pub fn hashed_flags_mask(scalar: &[u8]) -> u8 {
    let digest = Sha256::digest(scalar);
    digest[digest.len() - 1]
}
