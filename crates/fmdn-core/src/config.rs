//! Accessory configuration, validated once at construction.

use std::time::Duration;

use fmdn_proto::EcCurve;

use crate::error::AccessoryError;

/// Largest number of account keys an accessory may hold.
pub const MAX_ACCOUNT_KEYS: usize = 10;

/// Largest number of ringing components.
pub const MAX_RING_COMPONENTS: u8 = 3;

/// Default upper bound of the random delay added to each rotation.
pub const DEFAULT_ROTATION_JITTER_MAX_SECS: u64 = 204;

/// Default number of rotation windows between address rotations while
/// tracking protection is active (~24 h).
pub const DEFAULT_UTP_ROTATION_WINDOWS: u32 = 85;

/// Default interval between clock checkpoints.
pub const DEFAULT_CLOCK_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(3600);

/// Default delay before retrying a failed clock checkpoint.
pub const DEFAULT_CLOCK_CHECKPOINT_RETRY: Duration = Duration::from_secs(60);

/// Accessory configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryConfig {
    /// Curve for identifier derivation
    pub curve: EcCurve,
    /// Number of ringing components (0 = cannot ring)
    pub ring_components: u8,
    /// Whether the actuator supports volume selection
    pub volume_control: bool,
    /// Account key store capacity
    pub max_account_keys: usize,
    /// Calibrated TX power at 0 m, in dBm
    pub calibrated_tx_power: i8,
    /// Upper bound of the random delay added to each rotation
    pub rotation_jitter_max_secs: u64,
    /// Windows between address rotations while tracking protection is active
    pub utp_rotation_windows: u32,
    /// Interval between clock checkpoints
    pub clock_checkpoint_interval: Duration,
    /// Delay before retrying a failed clock checkpoint
    pub clock_checkpoint_retry: Duration,
}

impl Default for AccessoryConfig {
    fn default() -> Self {
        Self {
            curve: EcCurve::Secp160r1,
            ring_components: 1,
            volume_control: false,
            max_account_keys: 5,
            calibrated_tx_power: -10,
            rotation_jitter_max_secs: DEFAULT_ROTATION_JITTER_MAX_SECS,
            utp_rotation_windows: DEFAULT_UTP_ROTATION_WINDOWS,
            clock_checkpoint_interval: DEFAULT_CLOCK_CHECKPOINT_INTERVAL,
            clock_checkpoint_retry: DEFAULT_CLOCK_CHECKPOINT_RETRY,
        }
    }
}

impl AccessoryConfig {
    /// Check every field against its allowed range.
    ///
    /// # Errors
    ///
    /// - `AccessoryError::InvalidConfig` naming the first offending field
    pub fn validate(&self) -> Result<(), AccessoryError> {
        if self.ring_components > MAX_RING_COMPONENTS {
            return Err(invalid("ring_components", format!("must be at most {MAX_RING_COMPONENTS}")));
        }
        if !(1..=MAX_ACCOUNT_KEYS).contains(&self.max_account_keys) {
            return Err(invalid("max_account_keys", format!("must be in 1..={MAX_ACCOUNT_KEYS}")));
        }
        if self.volume_control && self.ring_components == 0 {
            return Err(invalid("volume_control", "requires at least one ring component".into()));
        }
        if self.utp_rotation_windows == 0 {
            return Err(invalid("utp_rotation_windows", "must be non-zero".into()));
        }
        if self.clock_checkpoint_interval.is_zero() || self.clock_checkpoint_retry.is_zero() {
            return Err(invalid("clock_checkpoint", "intervals must be non-zero".into()));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> AccessoryError {
    AccessoryError::InvalidConfig { field, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        AccessoryConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let config = AccessoryConfig { ring_components: 4, ..Default::default() };
        assert!(matches!(
            config.validate(),
            Err(AccessoryError::InvalidConfig { field: "ring_components", .. })
        ));

        let config = AccessoryConfig { max_account_keys: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = AccessoryConfig { max_account_keys: 11, ..Default::default() };
        assert!(config.validate().is_err());

        let config =
            AccessoryConfig { ring_components: 0, volume_control: true, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
