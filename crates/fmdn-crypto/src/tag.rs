//! One-time authentication tags over beacon action frames.
//!
//! ```text
//! request  = HMAC-SHA256(key, version ‖ nonce ‖ opcode ‖ len ‖ data)[0:8]
//! response = HMAC-SHA256(key, version ‖ nonce ‖ opcode ‖ len ‖ data ‖ 0x01)[0:8]
//! ```
//!
//! `len` is the value of the frame's length byte (tag plus data). The
//! response trailer keeps the two directions disjoint: a response tag
//! observed on air cannot be replayed as a request.

use fmdn_proto::{AUTH_TAG_SIZE, NONCE_SIZE, PROTOCOL_MAJOR_VERSION};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Truncated HMAC tag.
pub type AuthTag = [u8; AUTH_TAG_SIZE];

/// Byte appended to the MAC input of response tags only.
const RESPONSE_TRAILER: u8 = 0x01;

/// Which side of the exchange a tag authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagDirection {
    /// Peer to accessory
    Request,
    /// Accessory to peer
    Response,
}

/// Fields covered by a tag.
#[derive(Debug, Clone, Copy)]
pub struct TagInput<'a> {
    /// Challenge nonce of the connection
    pub nonce: &'a [u8; NONCE_SIZE],
    /// Raw opcode byte
    pub opcode: u8,
    /// Frame length byte (tag plus additional data)
    pub data_len: u8,
    /// Additional data after the tag
    pub additional: &'a [u8],
}

/// Compute a tag under `key` (an account key or a purpose key).
pub fn compute_tag(key: &[u8], input: &TagInput<'_>, direction: TagDirection) -> AuthTag {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(&[PROTOCOL_MAJOR_VERSION]);
    mac.update(input.nonce);
    mac.update(&[input.opcode, input.data_len]);
    mac.update(input.additional);
    if direction == TagDirection::Response {
        mac.update(&[RESPONSE_TRAILER]);
    }
    let result = mac.finalize().into_bytes();

    let mut tag = [0u8; AUTH_TAG_SIZE];
    tag.copy_from_slice(&result[..AUTH_TAG_SIZE]);
    tag
}

/// Recompute the request-form tag and compare it to `candidate` in constant
/// time.
pub fn verify_request_tag(key: &[u8], input: &TagInput<'_>, candidate: &AuthTag) -> bool {
    let expected = compute_tag(key, input, TagDirection::Request);
    expected[..].ct_eq(&candidate[..]).into()
}
