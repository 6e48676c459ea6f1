//! Device collaborators the core queries but does not own.

/// Battery bucket as reported by the device, already classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BatteryLevel {
    /// Device does not report battery level
    #[default]
    Unsupported = 0,
    /// Normal
    Normal = 1,
    /// Low
    Low = 2,
    /// Critically low
    CriticallyLow = 3,
}

impl BatteryLevel {
    /// Two-bit value placed in the hashed flags byte.
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Bucket for the two low bits of `bits`.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            1 => Self::Normal,
            2 => Self::Low,
            3 => Self::CriticallyLow,
            _ => Self::Unsupported,
        }
    }
}

/// Device state consulted while handling commands and building
/// advertisements.
pub trait Platform {
    /// Whether the user has opened the consent window for identity key
    /// readout (e.g. by pressing a button).
    fn user_consent_granted(&self) -> bool;

    /// Current battery bucket.
    fn battery_level(&self) -> BatteryLevel;
}

impl<P: Platform + ?Sized> Platform for &P {
    fn user_consent_granted(&self) -> bool {
        (**self).user_consent_granted()
    }

    fn battery_level(&self) -> BatteryLevel {
        (**self).battery_level()
    }
}
