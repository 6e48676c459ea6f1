//! Simulated device platform with test-controlled consent and battery.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU8, Ordering},
};

use fmdn_core::{BatteryLevel, Platform};

/// Platform whose consent window and battery bucket the test sets. Clones
/// share state.
#[derive(Debug, Clone, Default)]
pub struct SimPlatform {
    consent: Arc<AtomicBool>,
    battery: Arc<AtomicU8>,
}

impl SimPlatform {
    /// Consent closed, battery unsupported.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open or close the consent window.
    pub fn set_consent(&self, granted: bool) {
        self.consent.store(granted, Ordering::SeqCst);
    }

    /// Change the battery bucket.
    pub fn set_battery(&self, level: BatteryLevel) {
        self.battery.store(level.bits(), Ordering::SeqCst);
    }
}

impl Platform for SimPlatform {
    fn user_consent_granted(&self) -> bool {
        self.consent.load(Ordering::SeqCst)
    }

    fn battery_level(&self) -> BatteryLevel {
        BatteryLevel::from_bits(self.battery.load(Ordering::SeqCst))
    }
}
