//! Beacon action opcodes.

/// Command identifiers carried in the first byte of every command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Opcode {
    /// Read TX power, clock, curve and ringing capabilities
    ReadParameters = 0x00,
    /// Read whether an identity key is set and the current identifier
    ReadProvisioningState = 0x01,
    /// Install or replace the ephemeral identity key
    SetIdentityKey = 0x02,
    /// Remove the ephemeral identity key
    ClearIdentityKey = 0x03,
    /// Recover the ephemeral identity key (requires user consent)
    ReadIdentityKey = 0x04,
    /// Start or stop ringing
    Ring = 0x05,
    /// Read active ringing components and remaining timeout
    ReadRingState = 0x06,
    /// Enter unwanted tracking protection mode
    ActivateTrackingProtection = 0x07,
    /// Leave unwanted tracking protection mode
    DeactivateTrackingProtection = 0x08,
}

impl Opcode {
    /// Every opcode in wire order.
    pub const ALL: [Self; 9] = [
        Self::ReadParameters,
        Self::ReadProvisioningState,
        Self::SetIdentityKey,
        Self::ClearIdentityKey,
        Self::ReadIdentityKey,
        Self::Ring,
        Self::ReadRingState,
        Self::ActivateTrackingProtection,
        Self::DeactivateTrackingProtection,
    ];

    /// Parse a raw opcode byte. `None` if unrecognized.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    /// Raw opcode byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_table_matches_discriminants() {
        for (index, opcode) in Opcode::ALL.iter().enumerate() {
            assert_eq!(usize::from(opcode.to_u8()), index);
            assert_eq!(Opcode::from_u8(opcode.to_u8()), Some(*opcode));
        }
    }

    #[test]
    fn unknown_opcodes_rejected() {
        assert_eq!(Opcode::from_u8(0x09), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }
}
