//! Executors for the accessory's side effects.
//!
//! A real device implements [`ActionSink`] on top of its radio and sound
//! drivers. [`LoggingSink`] stands in on hosts without either.

use std::time::Duration;

use bytes::Bytes;
use fmdn_core::{AccessoryAction, ConnectionId};
use fmdn_proto::{RingComponents, RingVolume};

/// Radio and actuator operations the runtime drives.
pub trait ActionSink: Send + 'static {
    /// Send a notification on `connection`.
    fn notify(&mut self, connection: ConnectionId, frame: Bytes);

    /// Publish a new advertisement payload.
    fn advertise(&mut self, eid: &[u8], hashed_flags: u8, rotate_address: bool);

    /// Stop advertising.
    fn stop_advertising(&mut self);

    /// Drive the sound actuator.
    fn start_sound(&mut self, components: RingComponents, volume: RingVolume, timeout: Duration);

    /// Silence the sound actuator.
    fn stop_sound(&mut self);

    /// Execute one action. Actions without a device counterpart are logged.
    fn execute(&mut self, action: AccessoryAction) {
        match action {
            AccessoryAction::Notify { connection, frame } => self.notify(connection, frame),
            AccessoryAction::UpdateAdvertising { eid, hashed_flags, rotate_address } => {
                self.advertise(&eid, hashed_flags, rotate_address);
            },
            AccessoryAction::StopAdvertising => self.stop_advertising(),
            AccessoryAction::StartSound { components, volume, timeout } => {
                self.start_sound(components, volume, timeout);
            },
            AccessoryAction::StopSound => self.stop_sound(),
            AccessoryAction::ProvisioningChanged { provisioned } => {
                tracing::info!(provisioned, "provisioning changed");
            },
            AccessoryAction::ClockSynced => tracing::debug!("clock read by owner"),
            AccessoryAction::RingStateChanged(change) => {
                tracing::info!(
                    state = ?change.state,
                    components = change.components.bits(),
                    remaining_ds = change.remaining_ds,
                    "ring state changed"
                );
            },
        }
    }
}

/// Sink that logs every action. Notifications are handed to an optional
/// callback so a host transport can still deliver them.
#[derive(Default)]
pub struct LoggingSink {
    on_notify: Option<Box<dyn FnMut(ConnectionId, Bytes) + Send>>,
}

impl LoggingSink {
    /// Sink that only logs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that also forwards notifications to `on_notify`.
    pub fn with_notify(on_notify: impl FnMut(ConnectionId, Bytes) + Send + 'static) -> Self {
        Self { on_notify: Some(Box::new(on_notify)) }
    }
}

impl ActionSink for LoggingSink {
    fn notify(&mut self, connection: ConnectionId, frame: Bytes) {
        tracing::debug!(%connection, len = frame.len(), "notify");
        if let Some(on_notify) = self.on_notify.as_mut() {
            on_notify(connection, frame);
        }
    }

    fn advertise(&mut self, eid: &[u8], hashed_flags: u8, rotate_address: bool) {
        tracing::info!(eid = %hex::encode(eid), hashed_flags, rotate_address, "advertising");
    }

    fn stop_advertising(&mut self) {
        tracing::info!("advertising stopped");
    }

    fn start_sound(&mut self, components: RingComponents, volume: RingVolume, timeout: Duration) {
        tracing::info!(components = components.bits(), ?volume, timeout_ms = timeout.as_millis() as u64, "sound started");
    }

    fn stop_sound(&mut self) {
        tracing::info!("sound stopped");
    }
}
