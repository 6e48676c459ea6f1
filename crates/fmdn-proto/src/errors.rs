//! Protocol error types and wire error codes.

use thiserror::Error;

use crate::Opcode;

/// Result alias for wire format operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Structural errors found while encoding or decoding frames.
///
/// These never carry authentication meaning: a frame that parses cleanly may
/// still be rejected later for a bad tag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Not enough bytes left to read the next field
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Bytes needed to satisfy the read
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Header length byte does not match the bytes that follow it
    #[error("length mismatch: header declares {declared} payload bytes, frame carries {actual}")]
    LengthMismatch {
        /// Length declared in the header
        declared: usize,
        /// Length actually present
        actual: usize,
    },

    /// Opcode byte outside the known command set
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// Additional data has a length the opcode does not accept
    #[error("invalid payload length for {opcode:?}: {actual} bytes")]
    InvalidPayloadLength {
        /// Command being decoded
        opcode: Opcode,
        /// Length of the additional data
        actual: usize,
    },

    /// A field holds a value outside its domain
    #[error("invalid value {value:#04x} for field {field}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Offending raw value
        value: u8,
    },

    /// Decoder finished with unread bytes
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    /// Writer would exceed its size limit
    #[error("capacity exceeded: need {needed} bytes, {available} available")]
    CapacityExceeded {
        /// Bytes the push required
        needed: usize,
        /// Bytes still available
        available: usize,
    },
}

/// Error code returned to the peer when a write is rejected.
///
/// Values are attribute protocol application error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    /// Internal failure not attributable to the peer
    Unlikely = 0x0E,
    /// Missing challenge, bad tag, or failed ownership proof
    Unauthenticated = 0x80,
    /// Malformed length or field
    InvalidValue = 0x81,
    /// Identity key readout blocked by the consent policy
    NoUserConsent = 0x82,
}

impl ErrorCode {
    /// Raw code byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}
