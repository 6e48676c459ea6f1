//! Command, response and challenge frames.
//!
//! Frames are pure data holders. [`CommandFrame::decode`] only checks the
//! two-byte header against the bytes that follow; per-opcode payload layouts
//! live in [`crate::payloads`] and tag checks live in the core.

use bytes::Bytes;

use crate::{
    AUTH_TAG_SIZE, NONCE_SIZE, Opcode, PROTOCOL_MAJOR_VERSION,
    cursor::{Reader, Writer},
    errors::{ProtocolError, Result},
};

/// Size of the `opcode ‖ len` header shared by commands and responses.
pub const HEADER_SIZE: usize = 2;

/// Largest payload a one-byte length field can describe.
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize;

/// A command written by the peer.
///
/// The opcode is kept raw: an unknown opcode is a dispatch decision, not a
/// framing error.
///
/// # Invariants
///
/// - `payload.len()` equals the header length byte and is at most
///   [`MAX_PAYLOAD_SIZE`]. Enforced by [`CommandFrame::new`] and
///   [`CommandFrame::decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    opcode: u8,
    payload: Bytes,
}

impl CommandFrame {
    /// Build a command from a known opcode and its payload (tag included).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CapacityExceeded` if the payload exceeds 255 bytes
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::CapacityExceeded {
                needed: payload.len(),
                available: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self { opcode: opcode.to_u8(), payload })
    }

    /// Decode a command from the raw bytes of a transport write.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if fewer than two header bytes
    /// - `ProtocolError::LengthMismatch` if the length byte disagrees with the
    ///   number of bytes after the header
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let [opcode, declared] = reader
            .pull_array::<HEADER_SIZE>()
            .map_err(|_| ProtocolError::FrameTooShort { expected: HEADER_SIZE, actual: bytes.len() })?;

        let payload = reader.pull_rest();
        if usize::from(declared) != payload.len() {
            return Err(ProtocolError::LengthMismatch {
                declared: usize::from(declared),
                actual: payload.len(),
            });
        }

        Ok(Self { opcode, payload: Bytes::copy_from_slice(payload) })
    }

    /// Encode as `opcode ‖ len ‖ payload`.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.push(self.opcode);
        out.push(self.declared_len());
        out.extend_from_slice(&self.payload);
        Bytes::from(out)
    }

    /// Raw opcode byte.
    #[must_use]
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Opcode as enum. `None` if unrecognized.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }

    /// Value of the header length byte.
    #[must_use]
    pub fn declared_len(&self) -> u8 {
        // Bounded by MAX_PAYLOAD_SIZE at construction.
        self.payload.len() as u8
    }

    /// Whole payload, tag included.
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Split the payload into its leading tag and the additional data.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if the payload cannot hold a tag
    pub fn split_tag(&self) -> Result<([u8; AUTH_TAG_SIZE], &[u8])> {
        let mut reader = Reader::new(&self.payload);
        let tag = reader.pull_array::<AUTH_TAG_SIZE>()?;
        Ok((tag, reader.pull_rest()))
    }
}

/// A response notified to the peer after a successful write, or an
/// unsolicited ring state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Opcode of the command being answered
    pub opcode: Opcode,
    /// Response-form tag over the body
    pub tag: [u8; AUTH_TAG_SIZE],
    /// Response body (may be empty)
    pub body: Bytes,
}

impl ResponseFrame {
    /// Largest body that fits next to the tag under a one-byte length.
    pub const MAX_BODY_SIZE: usize = MAX_PAYLOAD_SIZE - AUTH_TAG_SIZE;

    /// Value of the header length byte: tag plus body.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CapacityExceeded` if the body is too large
    pub fn data_len(body_len: usize) -> Result<u8> {
        let total = AUTH_TAG_SIZE + body_len;
        u8::try_from(total).map_err(|_| ProtocolError::CapacityExceeded {
            needed: total,
            available: MAX_PAYLOAD_SIZE,
        })
    }

    /// Encode as `opcode ‖ len ‖ tag ‖ body`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CapacityExceeded` if the body is too large
    pub fn encode(&self) -> Result<Bytes> {
        let len = Self::data_len(self.body.len())?;
        let mut writer = Writer::with_limit(HEADER_SIZE + usize::from(len));
        writer.push_u8(self.opcode.to_u8())?;
        writer.push_u8(len)?;
        writer.push_slice(&self.tag)?;
        writer.push_slice(&self.body)?;
        Ok(writer.freeze())
    }

    /// Decode a notification (peer side).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if the header or tag is truncated
    /// - `ProtocolError::LengthMismatch` if the length byte is inconsistent
    /// - `ProtocolError::UnknownOpcode` for an unrecognized opcode
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let command = CommandFrame::decode(bytes)?;
        let opcode =
            command.opcode_enum().ok_or(ProtocolError::UnknownOpcode(command.opcode()))?;
        let (tag, body) = command.split_tag()?;
        Ok(Self { opcode, tag, body: Bytes::copy_from_slice(body) })
    }
}

/// Challenge returned by a transport read: protocol version and a fresh
/// nonce the next write must be authenticated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Challenge {
    /// Protocol major version
    pub version: u8,
    /// One-time nonce
    pub nonce: [u8; NONCE_SIZE],
}

impl Challenge {
    /// Encoded size.
    pub const SIZE: usize = 1 + NONCE_SIZE;

    /// Challenge for the current protocol version.
    #[must_use]
    pub fn new(nonce: [u8; NONCE_SIZE]) -> Self {
        Self { version: PROTOCOL_MAJOR_VERSION, nonce }
    }

    /// Encode as `version ‖ nonce`.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.push(self.version);
        out.extend_from_slice(&self.nonce);
        Bytes::from(out)
    }

    /// Decode a challenge (peer side).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` / `TrailingBytes` on a size mismatch
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let version = reader.pull_u8()?;
        let nonce = reader.pull_array::<NONCE_SIZE>()?;
        reader.finish()?;
        Ok(Self { version, nonce })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_command_with_tag() {
        let mut bytes = vec![0x05, 0x0B];
        bytes.extend_from_slice(&[0xAA; 8]);
        bytes.extend_from_slice(&[0x01, 0x00, 0x64]);

        let frame = CommandFrame::decode(&bytes).unwrap();
        assert_eq!(frame.opcode_enum(), Some(Opcode::Ring));
        assert_eq!(frame.declared_len(), 11);

        let (tag, additional) = frame.split_tag().unwrap();
        assert_eq!(tag, [0xAA; 8]);
        assert_eq!(additional, &[0x01, 0x00, 0x64]);
        assert_eq!(frame.encode().as_ref(), bytes.as_slice());
    }

    #[test]
    fn header_only_frame_has_empty_payload() {
        let frame = CommandFrame::decode(&[0x00, 0x00]).unwrap();
        assert!(frame.payload().is_empty());
        assert!(frame.split_tag().is_err());
    }

    #[test]
    fn reject_truncated_header() {
        assert_eq!(
            CommandFrame::decode(&[0x00]),
            Err(ProtocolError::FrameTooShort { expected: 2, actual: 1 })
        );
        assert!(CommandFrame::decode(&[]).is_err());
    }

    #[test]
    fn reject_declared_length_mismatch() {
        assert_eq!(
            CommandFrame::decode(&[0x00, 0x09, 1, 2, 3, 4, 5, 6, 7, 8]),
            Err(ProtocolError::LengthMismatch { declared: 9, actual: 8 })
        );
        assert_eq!(
            CommandFrame::decode(&[0x00, 0x01, 1, 2]),
            Err(ProtocolError::LengthMismatch { declared: 1, actual: 2 })
        );
    }

    #[test]
    fn unknown_opcode_survives_framing() {
        let frame = CommandFrame::decode(&[0x42, 0x00]).unwrap();
        assert_eq!(frame.opcode(), 0x42);
        assert_eq!(frame.opcode_enum(), None);
    }

    #[test]
    fn response_encoding_layout() {
        let response =
            ResponseFrame { opcode: Opcode::ReadRingState, tag: [0x11; 8], body: Bytes::from_static(&[1, 0, 10]) };
        let bytes = response.encode().unwrap();

        assert_eq!(bytes[0], 0x06);
        assert_eq!(bytes[1], 11);
        assert_eq!(&bytes[2..10], &[0x11; 8]);
        assert_eq!(&bytes[10..], &[1, 0, 10]);
        assert_eq!(ResponseFrame::decode(&bytes).unwrap(), response);
    }

    #[test]
    fn oversized_response_body_rejected() {
        let response = ResponseFrame {
            opcode: Opcode::ReadParameters,
            tag: [0; 8],
            body: Bytes::from(vec![0u8; ResponseFrame::MAX_BODY_SIZE + 1]),
        };
        assert!(matches!(response.encode(), Err(ProtocolError::CapacityExceeded { .. })));
    }

    #[test]
    fn challenge_layout() {
        let challenge = Challenge::new([1, 2, 3, 4, 5, 6, 7, 8]);
        let bytes = challenge.encode();

        assert_eq!(hex::encode(&bytes), "010102030405060708");
        assert_eq!(Challenge::decode(&bytes).unwrap(), challenge);
        assert!(Challenge::decode(&bytes[..8]).is_err());
    }
}
