//! Per-opcode payload layouts and the value types they carry.
//!
//! Requests are decoded from the additional data that follows the tag, with
//! the exact length each opcode allows. Responses encode to the body that
//! follows the response tag.

pub mod requests;
pub mod responses;

pub use requests::{
    ActivateTrackingProtectionRequest, ClearIdentityKeyRequest, DeactivateTrackingProtectionRequest,
    RingRequest, SetIdentityKeyRequest, expect_empty,
};
pub use responses::{BeaconParameters, ProvisioningState, RingStateChange, RingStatus};

use crate::errors::{ProtocolError, Result};

/// Elliptic curve used to derive the ephemeral identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum EcCurve {
    /// 20-byte identifiers
    #[default]
    Secp160r1 = 0x00,
    /// 32-byte identifiers
    Secp256r1 = 0x01,
}

impl EcCurve {
    /// Length of the ephemeral identifier on this curve.
    #[must_use]
    pub fn eid_len(self) -> usize {
        match self {
            Self::Secp160r1 => 20,
            Self::Secp256r1 => 32,
        }
    }

    /// Raw curve byte as reported in the beacon parameters.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a curve byte.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Secp160r1),
            0x01 => Ok(Self::Secp256r1),
            _ => Err(ProtocolError::InvalidField { field: "curve", value }),
        }
    }
}

/// Bitmask of ringing components.
///
/// `0x00` stops ringing and `0xFF` addresses every available component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RingComponents(u8);

impl RingComponents {
    /// Stop ringing on all components.
    pub const NONE: Self = Self(0x00);
    /// Right component (or the only component).
    pub const RIGHT: Self = Self(0x01);
    /// Left component.
    pub const LEFT: Self = Self(0x02);
    /// Charging case.
    pub const CASE: Self = Self(0x04);
    /// Every available component.
    pub const ALL: Self = Self(0xFF);

    /// Wrap a raw bitmask.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bitmask.
    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Mask covering the first `count` components.
    #[must_use]
    pub fn available(count: u8) -> Self {
        match count {
            0 => Self::NONE,
            1..=7 => Self((1u8 << count) - 1),
            _ => Self(0x7F),
        }
    }

    /// True for the stop request.
    #[must_use]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// True for the all-components sentinel.
    #[must_use]
    pub fn is_all(self) -> bool {
        self == Self::ALL
    }

    /// Number of components addressed. The sentinel counts as none here;
    /// resolve it against the available mask first.
    #[must_use]
    pub fn count(self) -> u32 {
        if self.is_all() { 0 } else { self.0.count_ones() }
    }

    /// True if every bit of `self` is set in `other`.
    #[must_use]
    pub fn is_subset_of(self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }
}

/// Requested ringing volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[repr(u8)]
pub enum RingVolume {
    /// Device default
    #[default]
    Default = 0x00,
    /// Low
    Low = 0x01,
    /// Medium
    Medium = 0x02,
    /// High
    High = 0x03,
}

impl RingVolume {
    /// Parse a volume byte.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Default),
            0x01 => Ok(Self::Low),
            0x02 => Ok(Self::Medium),
            0x03 => Ok(Self::High),
            _ => Err(ProtocolError::InvalidField { field: "volume", value }),
        }
    }

    /// Raw volume byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Outcome reported in a ring state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RingStateCode {
    /// Ringing started
    Started = 0x00,
    /// The actuator could not start or stop
    FailedToStartOrStop = 0x01,
    /// Stopped because the timeout expired
    StoppedByTimeout = 0x02,
    /// Stopped by a local user action
    StoppedByButton = 0x03,
    /// Stopped by a beacon action request
    StoppedByRequest = 0x04,
}

impl RingStateCode {
    /// Raw state byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a state byte.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Started),
            0x01 => Ok(Self::FailedToStartOrStop),
            0x02 => Ok(Self::StoppedByTimeout),
            0x03 => Ok(Self::StoppedByButton),
            0x04 => Ok(Self::StoppedByRequest),
            _ => Err(ProtocolError::InvalidField { field: "ring_state", value }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_masks() {
        assert_eq!(RingComponents::available(0), RingComponents::NONE);
        assert_eq!(RingComponents::available(1).bits(), 0b001);
        assert_eq!(RingComponents::available(2).bits(), 0b011);
        assert_eq!(RingComponents::available(3).bits(), 0b111);
    }

    #[test]
    fn subset_checks() {
        let available = RingComponents::available(2);
        assert!(RingComponents::LEFT.is_subset_of(available));
        assert!(!RingComponents::CASE.is_subset_of(available));
        assert!(RingComponents::NONE.is_subset_of(RingComponents::NONE));
    }

    #[test]
    fn count_ignores_sentinel() {
        assert_eq!(RingComponents::from_bits(0b111).count(), 3);
        assert_eq!(RingComponents::ALL.count(), 0);
    }

    #[test]
    fn curve_lengths() {
        assert_eq!(EcCurve::Secp160r1.eid_len(), 20);
        assert_eq!(EcCurve::Secp256r1.eid_len(), 32);
        assert!(EcCurve::from_u8(2).is_err());
    }

    #[test]
    fn volume_domain() {
        assert_eq!(RingVolume::from_u8(3).unwrap(), RingVolume::High);
        assert!(RingVolume::from_u8(4).is_err());
    }
}
