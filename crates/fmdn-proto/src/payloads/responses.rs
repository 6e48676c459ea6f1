//! Response body layouts (data after the response tag).

use crate::{
    cursor::{Reader, Writer},
    errors::{ProtocolError, Result},
    payloads::{EcCurve, RingComponents, RingStateCode},
};

/// Beacon parameters, encrypted as one AES block before they are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconParameters {
    /// Calibrated TX power at 0 m, in dBm
    pub tx_power: i8,
    /// Beacon clock in seconds
    pub clock: u32,
    /// Curve used for identifiers
    pub curve: EcCurve,
    /// Number of ringing components
    pub ring_components: u8,
    /// Ringing capability bits
    pub ring_capabilities: u8,
}

impl BeaconParameters {
    /// Plaintext block size.
    pub const SIZE: usize = 16;

    /// Capability bit: volume selection supported.
    pub const CAPABILITY_VOLUME: u8 = 0x01;

    /// Plaintext block, zero padded.
    #[must_use]
    pub fn to_block(&self) -> [u8; Self::SIZE] {
        let mut block = [0u8; Self::SIZE];
        block[0] = self.tx_power.to_be_bytes()[0];
        block[1..5].copy_from_slice(&self.clock.to_be_bytes());
        block[5] = self.curve.to_u8();
        block[6] = self.ring_components;
        block[7] = self.ring_capabilities;
        block
    }

    /// Parse a decrypted block (peer side).
    pub fn from_block(block: &[u8; Self::SIZE]) -> Result<Self> {
        let mut reader = Reader::new(block);
        let tx_power = i8::from_be_bytes([reader.pull_u8()?]);
        let clock = reader.pull_u32()?;
        let curve = EcCurve::from_u8(reader.pull_u8()?)?;
        let ring_components = reader.pull_u8()?;
        let ring_capabilities = reader.pull_u8()?;

        if reader.pull_rest().iter().any(|&b| b != 0) {
            return Err(ProtocolError::InvalidField { field: "padding", value: 0 });
        }

        Ok(Self { tx_power, clock, curve, ring_components, ring_capabilities })
    }
}

/// Provisioning state and, when provisioned, the current identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningState {
    /// An identity key is set
    pub provisioned: bool,
    /// The account key that authenticated the request is the owner key
    pub owner: bool,
    /// Current ephemeral identifier (only when provisioned)
    pub eid: Option<Vec<u8>>,
}

impl ProvisioningState {
    /// State bit: identity key set.
    pub const FLAG_PROVISIONED: u8 = 0x01;
    /// State bit: caller holds the owner key.
    pub const FLAG_OWNER: u8 = 0x02;

    /// Encode as `flags ‖ eid?`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let eid = self.eid.as_deref().unwrap_or_default();
        let mut writer = Writer::with_limit(1 + eid.len());
        let mut flags = 0;
        if self.provisioned {
            flags |= Self::FLAG_PROVISIONED;
        }
        if self.owner {
            flags |= Self::FLAG_OWNER;
        }
        writer.push_u8(flags)?;
        writer.push_slice(eid)?;
        Ok(writer.freeze().to_vec())
    }

    /// Decode (peer side).
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let flags = reader.pull_u8()?;
        let provisioned = flags & Self::FLAG_PROVISIONED != 0;
        let rest = reader.pull_rest();
        let eid = if provisioned && !rest.is_empty() { Some(rest.to_vec()) } else { None };
        if !provisioned && !rest.is_empty() {
            return Err(ProtocolError::TrailingBytes(rest.len()));
        }
        Ok(Self { provisioned, owner: flags & Self::FLAG_OWNER != 0, eid })
    }
}

/// Ring state change: answer to a ring request and unsolicited
/// notification when ringing stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingStateChange {
    /// What happened
    pub state: RingStateCode,
    /// Components ringing after the change
    pub components: RingComponents,
    /// Remaining timeout in deciseconds
    pub remaining_ds: u16,
}

impl RingStateChange {
    /// Encoded size.
    pub const SIZE: usize = 4;

    /// Encode as `state ‖ components ‖ remaining`.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let remaining = self.remaining_ds.to_be_bytes();
        [self.state.to_u8(), self.components.bits(), remaining[0], remaining[1]]
    }

    /// Decode (peer side).
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let state = RingStateCode::from_u8(reader.pull_u8()?)?;
        let components = RingComponents::from_bits(reader.pull_u8()?);
        let remaining_ds = reader.pull_u16()?;
        reader.finish()?;
        Ok(Self { state, components, remaining_ds })
    }
}

/// Answer to `ReadRingState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingStatus {
    /// Components currently ringing
    pub components: RingComponents,
    /// Remaining timeout in deciseconds
    pub remaining_ds: u16,
}

impl RingStatus {
    /// Encoded size.
    pub const SIZE: usize = 3;

    /// Encode as `components ‖ remaining`.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let remaining = self.remaining_ds.to_be_bytes();
        [self.components.bits(), remaining[0], remaining[1]]
    }

    /// Decode (peer side).
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let components = RingComponents::from_bits(reader.pull_u8()?);
        let remaining_ds = reader.pull_u16()?;
        reader.finish()?;
        Ok(Self { components, remaining_ds })
    }
}
