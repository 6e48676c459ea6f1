//! Request layouts (additional data after the tag).

use crate::{
    IDENTITY_KEY_SIZE, KEY_HASH_SIZE, Opcode,
    cursor::Reader,
    errors::{ProtocolError, Result},
    payloads::{RingComponents, RingVolume},
};

fn invalid_length(opcode: Opcode, data: &[u8]) -> ProtocolError {
    ProtocolError::InvalidPayloadLength { opcode, actual: data.len() }
}

/// Check that an opcode without additional data carries none.
pub fn expect_empty(opcode: Opcode, data: &[u8]) -> Result<()> {
    if data.is_empty() { Ok(()) } else { Err(invalid_length(opcode, data)) }
}

/// `SetIdentityKey`: the new key encrypted under the caller's account key,
/// plus proof of the current key when one is already set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetIdentityKeyRequest {
    /// New identity key, AES-128-ECB encrypted
    pub encrypted_key: [u8; IDENTITY_KEY_SIZE],
    /// Hash over the current key and nonce; present iff provisioned
    pub current_key_hash: Option<[u8; KEY_HASH_SIZE]>,
}

impl SetIdentityKeyRequest {
    /// Decode. `provisioned` selects whether the current-key hash is
    /// required.
    pub fn decode(data: &[u8], provisioned: bool) -> Result<Self> {
        let expected =
            if provisioned { IDENTITY_KEY_SIZE + KEY_HASH_SIZE } else { IDENTITY_KEY_SIZE };
        if data.len() != expected {
            return Err(invalid_length(Opcode::SetIdentityKey, data));
        }

        let mut reader = Reader::new(data);
        let encrypted_key = reader.pull_array()?;
        let current_key_hash = if provisioned { Some(reader.pull_array()?) } else { None };
        reader.finish()?;

        Ok(Self { encrypted_key, current_key_hash })
    }

    /// Encode (peer side).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.encrypted_key.to_vec();
        if let Some(hash) = self.current_key_hash {
            out.extend_from_slice(&hash);
        }
        out
    }
}

/// `ClearIdentityKey`: proof of the current key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearIdentityKeyRequest {
    /// Hash over the current key and nonce
    pub current_key_hash: [u8; KEY_HASH_SIZE],
}

impl ClearIdentityKeyRequest {
    /// Decode.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != KEY_HASH_SIZE {
            return Err(invalid_length(Opcode::ClearIdentityKey, data));
        }
        let mut reader = Reader::new(data);
        Ok(Self { current_key_hash: reader.pull_array()? })
    }

    /// Encode (peer side).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.current_key_hash.to_vec()
    }
}

/// `Ring`: component bitmask, timeout in deciseconds and optional volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingRequest {
    /// Components to ring (`NONE` stops)
    pub components: RingComponents,
    /// Timeout in deciseconds; ignored when stopping
    pub timeout_ds: u16,
    /// Requested volume, if the peer sent one
    pub volume: Option<RingVolume>,
}

impl RingRequest {
    /// Size without the optional volume byte.
    pub const BASE_SIZE: usize = 3;

    /// Decode.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != Self::BASE_SIZE && data.len() != Self::BASE_SIZE + 1 {
            return Err(invalid_length(Opcode::Ring, data));
        }

        let mut reader = Reader::new(data);
        let components = RingComponents::from_bits(reader.pull_u8()?);
        let timeout_ds = reader.pull_u16()?;
        let volume = reader.pull_optional_u8().map(RingVolume::from_u8).transpose()?;
        reader.finish()?;

        Ok(Self { components, timeout_ds, volume })
    }

    /// Encode (peer side).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.components.bits()];
        out.extend_from_slice(&self.timeout_ds.to_be_bytes());
        if let Some(volume) = self.volume {
            out.push(volume.to_u8());
        }
        out
    }
}

/// `ActivateTrackingProtection`: optional control flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivateTrackingProtectionRequest {
    /// Control flags; absent on the wire means zero
    pub control_flags: u8,
}

impl ActivateTrackingProtectionRequest {
    /// Skip ring authentication while protection is active.
    pub const SKIP_RING_AUTH: u8 = 0x01;

    /// Decode.
    pub fn decode(data: &[u8]) -> Result<Self> {
        match data {
            [] => Ok(Self { control_flags: 0 }),
            [flags] => Ok(Self { control_flags: *flags }),
            _ => Err(invalid_length(Opcode::ActivateTrackingProtection, data)),
        }
    }

    /// Encode (peer side). Flags are always sent.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        vec![self.control_flags]
    }
}

/// `DeactivateTrackingProtection`: proof of the current key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeactivateTrackingProtectionRequest {
    /// Hash over the current key and nonce
    pub current_key_hash: [u8; KEY_HASH_SIZE],
}

impl DeactivateTrackingProtectionRequest {
    /// Decode.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != KEY_HASH_SIZE {
            return Err(invalid_length(Opcode::DeactivateTrackingProtection, data));
        }
        let mut reader = Reader::new(data);
        Ok(Self { current_key_hash: reader.pull_array()? })
    }

    /// Encode (peer side).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.current_key_hash.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_key_length_depends_on_provisioning() {
        let unprovisioned = [0x11u8; 32];
        let request = SetIdentityKeyRequest::decode(&unprovisioned, false).unwrap();
        assert_eq!(request.current_key_hash, None);
        assert!(SetIdentityKeyRequest::decode(&unprovisioned, true).is_err());

        let mut provisioned = unprovisioned.to_vec();
        provisioned.extend_from_slice(&[0x22; 8]);
        let request = SetIdentityKeyRequest::decode(&provisioned, true).unwrap();
        assert_eq!(request.current_key_hash, Some([0x22; 8]));
        assert_eq!(request.encode(), provisioned);
        assert!(SetIdentityKeyRequest::decode(&provisioned, false).is_err());
    }

    #[test]
    fn ring_request_with_and_without_volume() {
        let request = RingRequest::decode(&[0x03, 0x02, 0x58]).unwrap();
        assert_eq!(request.components.bits(), 0x03);
        assert_eq!(request.timeout_ds, 600);
        assert_eq!(request.volume, None);

        let request = RingRequest::decode(&[0xFF, 0x00, 0x0A, 0x02]).unwrap();
        assert!(request.components.is_all());
        assert_eq!(request.volume, Some(RingVolume::Medium));
    }

    #[test]
    fn ring_request_rejects_bad_sizes_and_volume() {
        assert!(RingRequest::decode(&[0x01, 0x00]).is_err());
        assert!(RingRequest::decode(&[0x01, 0x00, 0x01, 0x00, 0x00]).is_err());
        assert_eq!(
            RingRequest::decode(&[0x01, 0x00, 0x01, 0x09]),
            Err(ProtocolError::InvalidField { field: "volume", value: 0x09 })
        );
    }

    #[test]
    fn activate_flags_optional() {
        assert_eq!(ActivateTrackingProtectionRequest::decode(&[]).unwrap().control_flags, 0);
        assert_eq!(ActivateTrackingProtectionRequest::decode(&[0x01]).unwrap().control_flags, 1);
        assert!(ActivateTrackingProtectionRequest::decode(&[0x01, 0x00]).is_err());
    }

    #[test]
    fn hash_requests_require_exact_size() {
        assert!(ClearIdentityKeyRequest::decode(&[0u8; 7]).is_err());
        assert!(DeactivateTrackingProtectionRequest::decode(&[0u8; 9]).is_err());
        assert!(ClearIdentityKeyRequest::decode(&[0u8; 8]).is_ok());
    }

    #[test]
    fn empty_requests() {
        assert!(expect_empty(Opcode::ReadParameters, &[]).is_ok());
        assert_eq!(
            expect_empty(Opcode::ReadRingState, &[0]),
            Err(ProtocolError::InvalidPayloadLength { opcode: Opcode::ReadRingState, actual: 1 })
        );
    }
}
