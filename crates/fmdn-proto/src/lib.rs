//! FMDN beacon action wire format.
//!
//! Everything a peer and the accessory exchange over the beacon actions
//! characteristic:
//!
//! ```text
//! Challenge (transport read):   version:u8 ‖ nonce[8]
//! Command   (transport write):  opcode:u8 ‖ len:u8 ‖ tag[8] ‖ additional
//! Response  (notification):     opcode:u8 ‖ len:u8 ‖ tag[8] ‖ body
//! ```
//!
//! Multi-byte integers are big-endian. All parsing goes through the checked
//! [`Reader`] cursor, so no attacker-controlled length can index out of
//! bounds: every failure is a [`ProtocolError`].
//!
//! This crate is pure data: it knows nothing about keys, tags or state.
//! Authentication happens in `fmdn-crypto` and `fmdn-core`.

#![forbid(unsafe_code)]

pub mod cursor;
pub mod errors;
pub mod frame;
pub mod opcode;
pub mod payloads;

pub use cursor::{Reader, Writer};
pub use errors::{ErrorCode, ProtocolError, Result};
pub use frame::{Challenge, CommandFrame, ResponseFrame};
pub use opcode::Opcode;
pub use payloads::{EcCurve, RingComponents, RingStateCode, RingVolume};

/// Major version of the beacon actions protocol, first byte of every
/// challenge and of every tag input.
pub const PROTOCOL_MAJOR_VERSION: u8 = 0x01;

/// Length of the random challenge nonce.
pub const NONCE_SIZE: usize = 8;

/// Length of the truncated HMAC tag carried by requests and responses.
pub const AUTH_TAG_SIZE: usize = 8;

/// Length of a hash proving knowledge of the current identity key.
pub const KEY_HASH_SIZE: usize = 8;

/// Length of the ephemeral identity key.
pub const IDENTITY_KEY_SIZE: usize = 32;

/// Length of an account key.
pub const ACCOUNT_KEY_SIZE: usize = 16;
