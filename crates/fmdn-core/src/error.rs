//! Error types for the accessory core.
//!
//! Strongly-typed errors per layer: key store loading, per-write dispatch
//! failures (each mapping to one wire [`ErrorCode`]), and construction
//! failures.

use fmdn_crypto::CryptoError;
use fmdn_proto::{ErrorCode, ProtocolError};
use thiserror::Error;

use crate::{connection::ConnectionId, storage::StorageError};

/// Errors from the account key store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyStoreError {
    /// Caller buffer cannot hold every stored key
    #[error("buffer too small: {needed} keys stored, room for {available}")]
    BufferTooSmall {
        /// Keys currently stored
        needed: usize,
        /// Buffer capacity
        available: usize,
    },

    /// Persisted records failed structural validation
    #[error("key store corrupted: {reason}")]
    Corrupted {
        /// What was wrong
        reason: String,
    },

    /// Backend failed while loading
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Why an authenticated command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Write without an unconsumed challenge on this connection
    NoChallenge,
    /// Tag matched no stored account key or purpose key
    TagMismatch,
    /// Command needs an identity key and none is set
    NotProvisioned,
    /// Matched account key is not the owner key
    NotOwner,
    /// Proof of the current identity key did not match
    KeyHashMismatch,
    /// Authenticated ring request asks for more components than exist
    ComponentsExceedCapability,
}

/// Failure of a single write. The write is rejected and no response is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Malformed frame or payload
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Authentication or authorization failed
    #[error("unauthenticated: {0:?}")]
    Unauthenticated(AuthFailure),

    /// Identity key readout requires user consent
    #[error("user consent required")]
    NoUserConsent,

    /// A well-formed field holds an unsupported value
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),

    /// A primitive failed; not attributable to the peer
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Operation on a connection that was never registered
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),
}

impl DispatchError {
    /// Wire error code reported to the transport.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Protocol(_) | Self::InvalidValue(_) => ErrorCode::InvalidValue,
            Self::Unauthenticated(_) => ErrorCode::Unauthenticated,
            Self::NoUserConsent => ErrorCode::NoUserConsent,
            Self::Crypto(_) | Self::UnknownConnection(_) => ErrorCode::Unlikely,
        }
    }

    /// True when the peer caused the failure.
    #[must_use]
    pub fn is_peer_fault(&self) -> bool {
        !matches!(self, Self::Crypto(_) | Self::UnknownConnection(_))
    }
}

impl From<AuthFailure> for DispatchError {
    fn from(failure: AuthFailure) -> Self {
        Self::Unauthenticated(failure)
    }
}

/// Errors constructing or starting an accessory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessoryError {
    /// Configuration value out of range
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig {
        /// Offending field
        field: &'static str,
        /// Constraint violated
        reason: String,
    },

    /// Account key store failed to come ready
    #[error("key store: {0}")]
    KeyStore(#[from] KeyStoreError),

    /// A persisted record other than an account key is malformed
    #[error("corrupted record {record}: {reason}")]
    Corrupted {
        /// Record path
        record: String,
        /// What was wrong
        reason: String,
    },

    /// Backend failed while loading
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
