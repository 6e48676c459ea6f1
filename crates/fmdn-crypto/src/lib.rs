//! FMDN Cryptographic Primitives
//!
//! Cryptographic building blocks for the accessory core. Everything except
//! the [`CryptoProvider`] seam is a pure function with deterministic output;
//! callers supply nonces and keys.
//!
//! # Key Hierarchy
//!
//! ```text
//! Account Key (16 B, shared with the owner's network)
//!        │
//!        └──► HMAC-SHA256 tag ─► ReadParameters, provisioning commands
//!
//! Ephemeral Identity Key (32 B)
//!        │
//!        ├──► SHA256(EIK ‖ 0x01)[0:8] ─► recovery key
//!        ├──► SHA256(EIK ‖ 0x02)[0:8] ─► ring key
//!        ├──► SHA256(EIK ‖ 0x03)[0:8] ─► tracking protection key
//!        ├──► SHA256(EIK ‖ nonce)[0:8] ─► proof of current key
//!        │
//!        └──► AES-256-ECB(EIK, seed(clock)) ─► curve reduction ─► EID
//! ```
//!
//! # Security
//!
//! Tag direction:
//! - Request and response tags differ by one trailing byte in the MAC input,
//!   so a tag the accessory emits never verifies as a request and vice versa
//!
//! Comparison:
//! - Candidate tags and key hashes are compared in constant time
//!
//! Secret hygiene:
//! - [`IdentityKey`] and [`PurposeKey`] are zeroized on drop and never
//!   printed by `Debug`

#![forbid(unsafe_code)]

pub mod eid;
mod error;
pub mod keys;
pub mod provider;
mod rustcrypto;
pub mod tag;

pub use eid::{
    EID_SEED_SIZE, ROTATION_PERIOD_EXPONENT, ROTATION_PERIOD_SECS, eid_seed, hashed_flags_mask,
    rotation_window,
};
pub use error::CryptoError;
pub use keys::{
    IdentityKey, KeyPurpose, PurposeKey, current_key_hash, derive_purpose_key,
    verify_current_key_hash,
};
pub use provider::{AES_BLOCK_SIZE, CryptoProvider, CurveReduction};
pub use rustcrypto::RustCryptoProvider;
pub use tag::{AuthTag, TagDirection, TagInput, compute_tag, verify_request_tag};
