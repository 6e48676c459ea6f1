//! Request authentication.
//!
//! Commands authenticate either with an account key, found by trying every
//! stored key in slot order, or with a purpose key derived from the identity
//! key. Responses carry a tag in the response encoding under the same key.

use fmdn_crypto::{
    AuthTag, IdentityKey, KeyPurpose, PurposeKey, TagDirection, TagInput, compute_tag,
    derive_purpose_key, verify_request_tag,
};
use fmdn_proto::{CommandFrame, NONCE_SIZE, Opcode, ProtocolError, ResponseFrame};

use crate::{
    error::AuthFailure,
    key_store::{AccountKey, KeyStore},
    storage::Storage,
};

/// A decoded command bound to the nonce it must be authenticated against.
#[derive(Debug, Clone, Copy)]
pub struct SignedRequest<'a> {
    nonce: &'a [u8; NONCE_SIZE],
    opcode: u8,
    data_len: u8,
    tag: AuthTag,
    additional: &'a [u8],
}

impl<'a> SignedRequest<'a> {
    /// Split the frame's tag from its additional data.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if the payload cannot hold a tag
    pub fn parse(nonce: &'a [u8; NONCE_SIZE], frame: &'a CommandFrame) -> Result<Self, ProtocolError> {
        let (tag, additional) = frame.split_tag()?;
        Ok(Self { nonce, opcode: frame.opcode(), data_len: frame.declared_len(), tag, additional })
    }

    /// Data after the tag.
    pub fn additional(&self) -> &'a [u8] {
        self.additional
    }

    /// Nonce the request is bound to.
    pub fn nonce(&self) -> &'a [u8; NONCE_SIZE] {
        self.nonce
    }

    /// Whether the tag verifies under `key`.
    pub fn verify(&self, key: &[u8]) -> bool {
        verify_request_tag(key, &self.tag_input(), &self.tag)
    }

    fn tag_input(&self) -> TagInput<'a> {
        TagInput {
            nonce: self.nonce,
            opcode: self.opcode,
            data_len: self.data_len,
            additional: self.additional,
        }
    }
}

/// Find the stored account key the request tag verifies under.
///
/// Keys are tried in slot order. A match becomes the most recently used key
/// before the caller applies any further checks.
///
/// # Errors
///
/// - `AuthFailure::TagMismatch` if no stored key verifies
pub fn find_key_by_tag<S: Storage>(
    store: &mut KeyStore<S>,
    request: &SignedRequest<'_>,
) -> Result<AccountKey, AuthFailure> {
    let found = store.find(|key| request.verify(key.as_bytes()));
    match &found {
        Some(key) => tracing::trace!(id = key.id(), "request tag matched account key"),
        None => tracing::debug!(candidates = store.count(), "request tag matched no account key"),
    }
    found.ok_or(AuthFailure::TagMismatch)
}

/// Derive the purpose key for `purpose`.
///
/// # Errors
///
/// - `AuthFailure::NotProvisioned` without an identity key
pub fn purpose_key(
    identity_key: Option<&IdentityKey>,
    purpose: KeyPurpose,
) -> Result<PurposeKey, AuthFailure> {
    identity_key
        .map(|eik| derive_purpose_key(eik, purpose))
        .ok_or(AuthFailure::NotProvisioned)
}

/// Derive the purpose key and check the request tag under it.
///
/// # Errors
///
/// - `AuthFailure::NotProvisioned` without an identity key
/// - `AuthFailure::TagMismatch` if the tag does not verify
pub fn verify_purpose(
    identity_key: Option<&IdentityKey>,
    purpose: KeyPurpose,
    request: &SignedRequest<'_>,
) -> Result<PurposeKey, AuthFailure> {
    let key = purpose_key(identity_key, purpose)?;
    if request.verify(key.as_bytes()) { Ok(key) } else { Err(AuthFailure::TagMismatch) }
}

/// Build a response frame tagged under `key` with the response encoding.
///
/// # Errors
///
/// - `ProtocolError::CapacityExceeded` if the body does not fit a frame
pub fn signed_response(
    key: &[u8],
    nonce: &[u8; NONCE_SIZE],
    opcode: Opcode,
    body: Vec<u8>,
) -> Result<ResponseFrame, ProtocolError> {
    let data_len = ResponseFrame::data_len(body.len())?;
    let input = TagInput { nonce, opcode: opcode.to_u8(), data_len, additional: &body };
    let tag = compute_tag(key, &input, TagDirection::Response);
    Ok(ResponseFrame { opcode, tag, body: body.into() })
}

/// Check a response frame's tag (peer side).
pub fn verify_response(key: &[u8], nonce: &[u8; NONCE_SIZE], frame: &ResponseFrame) -> bool {
    let Ok(data_len) = ResponseFrame::data_len(frame.body.len()) else {
        return false;
    };
    let input =
        TagInput { nonce, opcode: frame.opcode.to_u8(), data_len, additional: &frame.body };
    compute_tag(key, &input, TagDirection::Response) == frame.tag
}
