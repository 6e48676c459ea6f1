//! Ephemeral identity: provisioning, identifier rotation and tracking
//! protection.
//!
//! ```text
//! ┌───────────────┐  provision   ┌─────────────────────────────┐
//! │ Unprovisioned │─────────────>│ Provisioned                 │
//! │               │<─────────────│   Normal ⇄ TrackingProtect  │
//! └───────────────┘  unprovision └─────────────────────────────┘
//! ```
//!
//! The identifier is recomputed at most once per rotation window. Forced
//! rotations (tracking protection transitions) always produce a new
//! identifier: when the current window already has one, the next window is
//! used instead, and an identifier already one window ahead falls back to
//! the clock's window. The identifier window therefore never runs more than
//! one window ahead of the clock. While tracking protection is active,
//! ordinary rotations are withheld until the configured number of windows
//! has elapsed.
//!
//! The engine computes a new identifier completely before installing it, so
//! a failing primitive leaves the previous identifier and flags mask intact.

use fmdn_crypto::{
    CryptoError, CryptoProvider, IdentityKey, ROTATION_PERIOD_EXPONENT, ROTATION_PERIOD_SECS,
    hashed_flags_mask, rotation_window,
};
use fmdn_proto::{EcCurve, payloads::ActivateTrackingProtectionRequest};

use crate::{
    error::AccessoryError,
    platform::BatteryLevel,
    storage::{RecordKey, Storage},
};

const FLAG_UTP: u8 = 0x80;
const BATTERY_SHIFT: u8 = 5;

/// Identifier and flags byte to publish on the advertising channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Current ephemeral identifier
    pub eid: Vec<u8>,
    /// Flags byte XORed with the rotation's mask
    pub hashed_flags: u8,
    /// Whether the link-layer address must change with this update
    pub rotate_address: bool,
}

/// Tracking protection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UtpState {
    active: bool,
    control_flags: u8,
    suppressed_windows: u32,
}

impl UtpState {
    /// True while tracking protection is active.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Control flags supplied on activation.
    pub fn control_flags(&self) -> u8 {
        self.control_flags
    }

    /// True if ring requests skip authentication.
    pub fn skip_ring_auth(&self) -> bool {
        self.active && self.control_flags & ActivateTrackingProtectionRequest::SKIP_RING_AUTH != 0
    }

    /// Windows elapsed since the last rotation while rotations are withheld.
    pub fn suppressed_windows(&self) -> u32 {
        self.suppressed_windows
    }
}

/// Whether a provisioning call installed the first key or replaced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Was unprovisioned
    Provisioned,
    /// A key was already set
    Replaced,
}

#[derive(Debug, Clone)]
struct CurrentEid {
    window: u32,
    eid: Vec<u8>,
    mask: u8,
}

/// Owner of the identity key and the identifier derived from it.
pub struct IdentityEngine<S: Storage> {
    storage: S,
    curve: EcCurve,
    utp_rotation_windows: u32,
    identity_key: Option<IdentityKey>,
    current: Option<CurrentEid>,
    utp: UtpState,
    persist_pending: bool,
}

impl<S: Storage> IdentityEngine<S> {
    /// Restore the identity key record.
    ///
    /// The identifier is not computed here; the first rotation does that.
    ///
    /// # Errors
    ///
    /// - `AccessoryError::Corrupted` if the record is not 32 bytes
    /// - `AccessoryError::Storage` if the backend fails to read
    pub fn load(storage: S, curve: EcCurve, utp_rotation_windows: u32) -> Result<Self, AccessoryError> {
        let identity_key = match storage.get(RecordKey::IdentityKey)? {
            Some(bytes) => Some(IdentityKey::from_slice(&bytes).ok_or_else(|| {
                AccessoryError::Corrupted {
                    record: RecordKey::IdentityKey.path(),
                    reason: format!("expected 32 bytes, found {}", bytes.len()),
                }
            })?),
            None => None,
        };

        tracing::debug!(provisioned = identity_key.is_some(), ?curve, "identity loaded");
        Ok(Self {
            storage,
            curve,
            utp_rotation_windows,
            identity_key,
            current: None,
            utp: UtpState::default(),
            persist_pending: false,
        })
    }

    /// True while an identity key is set.
    pub fn is_provisioned(&self) -> bool {
        self.identity_key.is_some()
    }

    /// The identity key.
    pub fn identity_key(&self) -> Option<&IdentityKey> {
        self.identity_key.as_ref()
    }

    /// Current identifier, once the first rotation has run.
    pub fn eid(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|current| current.eid.as_slice())
    }

    /// Window the current identifier was derived for.
    pub fn current_window(&self) -> Option<u32> {
        self.current.as_ref().map(|current| current.window)
    }

    /// Tracking protection state.
    pub fn utp(&self) -> &UtpState {
        &self.utp
    }

    /// Curve identifiers are derived on.
    pub fn curve(&self) -> EcCurve {
        self.curve
    }

    /// True if the identity key record still has to be written.
    pub fn persist_pending(&self) -> bool {
        self.persist_pending
    }

    /// Install `key` and derive its identifier for the window of `clock`.
    ///
    /// Tracking protection starts inactive for a fresh provisioning and is
    /// kept when a key is replaced.
    ///
    /// # Errors
    ///
    /// - Any primitive failure. Nothing changes in that case.
    pub fn provision(
        &mut self,
        key: IdentityKey,
        clock: u32,
        crypto: &impl CryptoProvider,
        battery: BatteryLevel,
    ) -> Result<(ProvisionOutcome, Advertisement), CryptoError> {
        let outcome = if self.is_provisioned() {
            ProvisionOutcome::Replaced
        } else {
            ProvisionOutcome::Provisioned
        };
        let utp = match outcome {
            ProvisionOutcome::Provisioned => UtpState::default(),
            ProvisionOutcome::Replaced => self.utp,
        };

        let window = rotation_window(clock);
        let window = self.current_window().map_or(window, |last| last.max(window));
        let current = derive(crypto, self.curve, &key, window)?;

        self.identity_key = Some(key);
        self.current = Some(current);
        self.utp = utp;
        self.utp.suppressed_windows = 0;
        self.persist();

        tracing::info!(?outcome, window, "identity key installed");
        Ok((outcome, self.publish(battery, true)))
    }

    /// Erase the identity key and reset tracking protection. Returns false if
    /// nothing was set.
    pub fn unprovision(&mut self) -> bool {
        let was_provisioned = self.identity_key.take().is_some();
        self.current = None;
        self.utp = UtpState::default();
        self.persist();

        if was_provisioned {
            tracing::info!("identity key erased");
        }
        was_provisioned
    }

    /// Rotation tick for `clock`.
    ///
    /// Returns `None` when unprovisioned, when the window has not advanced,
    /// or while tracking protection withholds the rotation. A forced
    /// rotation always yields a new identifier.
    ///
    /// # Errors
    ///
    /// - Any primitive failure. The previous identifier stays current.
    pub fn rotate(
        &mut self,
        clock: u32,
        force: bool,
        crypto: &impl CryptoProvider,
        battery: BatteryLevel,
    ) -> Result<Option<Advertisement>, CryptoError> {
        let Some(key) = self.identity_key.as_ref() else {
            return Ok(None);
        };

        let window = rotation_window(clock);
        let last = self.current.as_ref().map(|current| current.window);

        let target = match last {
            Some(last) if force && last == window => window.wrapping_add(ROTATION_PERIOD_SECS),
            Some(last) if force && last > window => window,
            Some(last) if !force && window <= last => return Ok(None),
            Some(last) if !force && self.utp.active => {
                let elapsed = (window - last) >> ROTATION_PERIOD_EXPONENT;
                if elapsed < self.utp_rotation_windows {
                    self.utp.suppressed_windows = elapsed;
                    tracing::trace!(elapsed, "rotation withheld by tracking protection");
                    return Ok(None);
                }
                window
            },
            _ => window,
        };

        let current = derive(crypto, self.curve, key, target)?;
        tracing::debug!(window = target, force, utp = self.utp.active, "identifier rotated");

        self.current = Some(current);
        self.utp.suppressed_windows = 0;
        Ok(Some(self.publish(battery, true)))
    }

    /// Enter tracking protection with `control_flags` and force a rotation.
    ///
    /// Returns `None` when unprovisioned.
    ///
    /// # Errors
    ///
    /// - Any primitive failure. The mode is left unchanged.
    pub fn activate_utp(
        &mut self,
        control_flags: u8,
        clock: u32,
        crypto: &impl CryptoProvider,
        battery: BatteryLevel,
    ) -> Result<Option<Advertisement>, CryptoError> {
        let next = UtpState { active: true, control_flags, suppressed_windows: 0 };
        let advertisement = self.transition_utp(next, clock, crypto, battery)?;
        tracing::info!(control_flags, "tracking protection activated");
        Ok(advertisement)
    }

    /// Leave tracking protection and force a rotation.
    ///
    /// Returns `None` when unprovisioned.
    ///
    /// # Errors
    ///
    /// - Any primitive failure. The mode is left unchanged.
    pub fn deactivate_utp(
        &mut self,
        clock: u32,
        crypto: &impl CryptoProvider,
        battery: BatteryLevel,
    ) -> Result<Option<Advertisement>, CryptoError> {
        let advertisement = self.transition_utp(UtpState::default(), clock, crypto, battery)?;
        tracing::info!("tracking protection deactivated");
        Ok(advertisement)
    }

    /// Current identifier with freshly computed flags, without an address
    /// change. Used when only the battery bucket changed.
    pub fn advertisement(&self, battery: BatteryLevel) -> Option<Advertisement> {
        self.current.as_ref()?;
        Some(self.publish(battery, false))
    }

    /// Current identifier with freshly computed flags and an address
    /// change, for (re)starting the advertising cycle.
    pub fn announcement(&self, battery: BatteryLevel) -> Option<Advertisement> {
        self.current.as_ref()?;
        Some(self.publish(battery, true))
    }

    /// Derive the identifier for the window of `clock` after a restore,
    /// without publishing it. No-op when unprovisioned or already derived.
    ///
    /// # Errors
    ///
    /// - Any primitive failure. The identifier stays unset and the next
    ///   rotation derives it.
    pub fn restore(&mut self, clock: u32, crypto: &impl CryptoProvider) -> Result<(), CryptoError> {
        let Some(key) = self.identity_key.as_ref() else {
            return Ok(());
        };
        if self.current.is_some() {
            return Ok(());
        }
        let window = rotation_window(clock);
        self.current = Some(derive(crypto, self.curve, key, window)?);
        tracing::debug!(window, "identifier restored");
        Ok(())
    }

    /// Write the identity key record again if the last write failed.
    pub fn retry_persist(&mut self) {
        if self.persist_pending {
            self.persist();
        }
    }

    fn transition_utp(
        &mut self,
        next: UtpState,
        clock: u32,
        crypto: &impl CryptoProvider,
        battery: BatteryLevel,
    ) -> Result<Option<Advertisement>, CryptoError> {
        if !self.is_provisioned() {
            return Ok(None);
        }
        let previous = std::mem::replace(&mut self.utp, next);
        self.rotate(clock, true, crypto, battery).inspect_err(|_| self.utp = previous)
    }

    fn publish(&self, battery: BatteryLevel, rotate_address: bool) -> Advertisement {
        let (eid, mask) = match &self.current {
            Some(current) => (current.eid.clone(), current.mask),
            None => (Vec::new(), 0),
        };
        Advertisement { eid, hashed_flags: self.flags(battery) ^ mask, rotate_address }
    }

    fn flags(&self, battery: BatteryLevel) -> u8 {
        let utp = if self.utp.active { FLAG_UTP } else { 0 };
        utp | (battery.bits() << BATTERY_SHIFT)
    }

    fn persist(&mut self) {
        let result = match &self.identity_key {
            Some(key) => self.storage.put(RecordKey::IdentityKey, key.as_bytes()),
            None => self.storage.delete(RecordKey::IdentityKey),
        };
        self.persist_pending = match result {
            Ok(()) => false,
            Err(e) => {
                tracing::warn!(error = %e, "identity key write failed, will retry");
                true
            },
        };
    }
}

fn derive(
    crypto: &impl CryptoProvider,
    curve: EcCurve,
    key: &IdentityKey,
    window: u32,
) -> Result<CurrentEid, CryptoError> {
    let reduction = crypto.compute_eid(curve, key, window).inspect_err(|e| {
        tracing::error!(error = %e, window, "identifier derivation failed");
    })?;
    let mask = hashed_flags_mask(&reduction.scalar);
    Ok(CurrentEid { window, eid: reduction.eid, mask })
}
