//! Device platform backed by shared state the runtime updates.

#![allow(clippy::disallowed_types, reason = "Consent deadline is a single short-held value")]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU8, Ordering},
    },
    time::{Duration, Instant},
};

use fmdn_core::{BatteryLevel, Platform};

/// How long identity key readout stays allowed after the user opens the
/// consent window.
pub const DEFAULT_CONSENT_WINDOW: Duration = Duration::from_secs(300);

/// Consent window and battery bucket. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct DevicePlatform {
    consent_until: Arc<Mutex<Option<Instant>>>,
    battery: Arc<AtomicU8>,
}

impl DevicePlatform {
    /// Consent closed, battery unsupported.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the consent window for `window` from now.
    #[allow(clippy::disallowed_methods)]
    pub fn grant_consent(&self, window: Duration) {
        *self.lock() = Some(Instant::now() + window);
        tracing::info!(window_secs = window.as_secs(), "user consent window opened");
    }

    /// Close the consent window early.
    pub fn revoke_consent(&self) {
        *self.lock() = None;
        tracing::info!("user consent window closed");
    }

    /// Record a new battery bucket.
    pub fn set_battery(&self, level: BatteryLevel) {
        self.battery.store(level.bits(), Ordering::SeqCst);
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.consent_until.lock().expect("DevicePlatform mutex poisoned")
    }
}

impl Platform for DevicePlatform {
    #[allow(clippy::disallowed_methods)]
    fn user_consent_granted(&self) -> bool {
        self.lock().is_some_and(|until| Instant::now() < until)
    }

    fn battery_level(&self) -> BatteryLevel {
        BatteryLevel::from_bits(self.battery.load(Ordering::SeqCst))
    }
}
