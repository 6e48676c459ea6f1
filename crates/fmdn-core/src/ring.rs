//! Ringing state machine.
//!
//! One authoritative state: idle or ringing a set of components until a
//! deadline. Wireless requests, local (button/app) events and timeout expiry
//! all transition the same state. A [`RingContext`] remembers which
//! connection last drove ringing so later state changes can be notified to
//! it.

use std::{
    ops::{Add, Sub},
    time::Duration,
};

use fmdn_proto::{
    NONCE_SIZE,
    payloads::{RingComponents, RingRequest, RingStateChange, RingStateCode, RingStatus, RingVolume},
};

use crate::{connection::ConnectionId, error::DispatchError};

/// Longest ring timeout a peer may request: 10 minutes in deciseconds.
pub const MAX_RING_TIMEOUT_DS: u16 = 6000;

/// Connection that owns the current ring interaction and the nonce that
/// authenticates notifications sent to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingContext {
    /// Owning connection
    pub connection: ConnectionId,
    /// Nonce of the authorizing request
    pub nonce: [u8; NONCE_SIZE],
}

/// A validated ring request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingCommand {
    /// Ring `components` for `timeout_ds` deciseconds
    Start {
        /// Resolved component mask (never the all sentinel)
        components: RingComponents,
        /// Timeout in deciseconds, `1..=MAX_RING_TIMEOUT_DS`
        timeout_ds: u16,
        /// Volume
        volume: RingVolume,
    },
    /// Stop ringing
    Stop,
}

/// Ring state change reported by a local (non-wireless) source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalRingEvent {
    /// Local source started ringing
    Started {
        /// Components now ringing
        components: RingComponents,
        /// Timeout in deciseconds
        timeout_ds: u16,
    },
    /// User pressed the button
    StoppedByButton,
    /// Actuator failed to start or stop
    Failed,
}

/// Instruction for the sound actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCommand {
    /// Start playing
    Start {
        /// Components to drive
        components: RingComponents,
        /// Volume
        volume: RingVolume,
        /// Play duration
        timeout: Duration,
    },
    /// Stop playing
    Stop,
}

/// Result of applying a ring command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingTransition {
    /// State change to report
    pub change: RingStateChange,
    /// Actuator instruction, if any
    pub sound: Option<SoundCommand>,
}

#[derive(Debug, Clone, Copy)]
struct ActiveRing<I> {
    components: RingComponents,
    deadline: I,
}

/// Ringing state machine, generic over the environment's instant type.
#[derive(Debug)]
pub struct RingEngine<I> {
    component_count: u8,
    available: RingComponents,
    volume_control: bool,
    active: Option<ActiveRing<I>>,
    context: Option<RingContext>,
}

impl<I> RingEngine<I>
where
    I: Copy + Ord + Sub<Output = Duration> + Add<Duration, Output = I>,
{
    /// Engine for a device with `component_count` ringing components.
    pub fn new(component_count: u8, volume_control: bool) -> Self {
        Self {
            component_count,
            available: RingComponents::available(component_count),
            volume_control,
            active: None,
            context: None,
        }
    }

    /// Replace the all-components sentinel by the available mask.
    pub fn resolve(&self, components: RingComponents) -> RingComponents {
        if components.is_all() { self.available } else { components }
    }

    /// True if the request addresses more components than the device has.
    pub fn exceeds_capability(&self, components: RingComponents) -> bool {
        self.resolve(components).count() > u32::from(self.component_count)
    }

    /// Check a request against the device's components, volume support and
    /// timeout range. The timeout is ignored when stopping.
    ///
    /// # Errors
    ///
    /// - `DispatchError::InvalidValue` naming the offending field
    pub fn validate(&self, request: &RingRequest) -> Result<RingCommand, DispatchError> {
        let components = self.resolve(request.components);
        if components.is_none() {
            return Ok(RingCommand::Stop);
        }
        if !components.is_subset_of(self.available) {
            return Err(DispatchError::InvalidValue("ring components"));
        }

        let volume = match request.volume {
            Some(volume) if !self.volume_control && volume != RingVolume::Default => {
                return Err(DispatchError::InvalidValue("ring volume"));
            },
            Some(volume) => volume,
            None => RingVolume::Default,
        };

        if request.timeout_ds == 0 || request.timeout_ds > MAX_RING_TIMEOUT_DS {
            return Err(DispatchError::InvalidValue("ring timeout"));
        }

        Ok(RingCommand::Start { components, timeout_ds: request.timeout_ds, volume })
    }

    /// Apply a validated command.
    pub fn apply(&mut self, command: RingCommand, now: I) -> RingTransition {
        match command {
            RingCommand::Start { components, timeout_ds, volume } => {
                let timeout = deciseconds(timeout_ds);
                self.active = Some(ActiveRing { components, deadline: now + timeout });
                tracing::debug!(components = components.bits(), timeout_ds, "ringing started");
                RingTransition {
                    change: RingStateChange {
                        state: RingStateCode::Started,
                        components,
                        remaining_ds: timeout_ds,
                    },
                    sound: Some(SoundCommand::Start { components, volume, timeout }),
                }
            },
            RingCommand::Stop => {
                let was_ringing = self.active.take().is_some();
                tracing::debug!(was_ringing, "ringing stopped by request");
                RingTransition {
                    change: stopped(RingStateCode::StoppedByRequest),
                    sound: was_ringing.then_some(SoundCommand::Stop),
                }
            },
        }
    }

    /// Reconcile a state change reported by a local source. The actuator was
    /// already driven by that source. A local timeout is clamped to
    /// `1..=MAX_RING_TIMEOUT_DS`.
    pub fn local_event(&mut self, event: LocalRingEvent, now: I) -> RingStateChange {
        match event {
            LocalRingEvent::Started { components, timeout_ds } => {
                let components = self.resolve(components);
                let timeout_ds = timeout_ds.clamp(1, MAX_RING_TIMEOUT_DS);
                self.active =
                    Some(ActiveRing { components, deadline: now + deciseconds(timeout_ds) });
                RingStateChange { state: RingStateCode::Started, components, remaining_ds: timeout_ds }
            },
            LocalRingEvent::StoppedByButton => {
                self.active = None;
                stopped(RingStateCode::StoppedByButton)
            },
            LocalRingEvent::Failed => {
                self.active = None;
                stopped(RingStateCode::FailedToStartOrStop)
            },
        }
    }

    /// Stop ringing if the deadline has passed.
    pub fn poll_timeout(&mut self, now: I) -> Option<RingStateChange> {
        let active = self.active?;
        if now < active.deadline {
            return None;
        }
        self.active = None;
        tracing::debug!(components = active.components.bits(), "ringing timed out");
        Some(stopped(RingStateCode::StoppedByTimeout))
    }

    /// Components ringing and remaining timeout.
    pub fn status(&self, now: I) -> RingStatus {
        match self.active {
            Some(active) => RingStatus {
                components: active.components,
                remaining_ds: remaining_ds(active.deadline, now),
            },
            None => RingStatus { components: RingComponents::NONE, remaining_ds: 0 },
        }
    }

    /// True while ringing.
    pub fn is_ringing(&self) -> bool {
        self.active.is_some()
    }

    /// When ringing will time out.
    pub fn next_deadline(&self) -> Option<I> {
        self.active.map(|active| active.deadline)
    }

    /// Record the connection that drives ringing.
    pub fn set_context(&mut self, context: RingContext) {
        self.context = Some(context);
    }

    /// Current owner of the ring interaction.
    pub fn context(&self) -> Option<&RingContext> {
        self.context.as_ref()
    }

    /// Forget the ring owner.
    pub fn clear_context(&mut self) {
        self.context = None;
    }

    /// Forget the ring owner if it is `connection`. Returns true if cleared.
    pub fn release_connection(&mut self, connection: ConnectionId) -> bool {
        if self.context.is_some_and(|ctx| ctx.connection == connection) {
            self.context = None;
            true
        } else {
            false
        }
    }
}

fn stopped(state: RingStateCode) -> RingStateChange {
    RingStateChange { state, components: RingComponents::NONE, remaining_ds: 0 }
}

fn deciseconds(ds: u16) -> Duration {
    Duration::from_millis(u64::from(ds) * 100)
}

fn remaining_ds<I>(deadline: I, now: I) -> u16
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    if now >= deadline {
        return 0;
    }
    let remaining = (deadline - now).as_millis().div_ceil(100);
    u16::try_from(remaining).unwrap_or(u16::MAX)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn request(components: u8, timeout_ds: u16, volume: Option<RingVolume>) -> RingRequest {
        RingRequest { components: RingComponents::from_bits(components), timeout_ds, volume }
    }

    #[test]
    fn validates_components_against_available() {
        let engine = RingEngine::<Instant>::new(2, false);

        assert!(engine.validate(&request(0b011, 100, None)).is_ok());
        assert_eq!(
            engine.validate(&request(0b100, 100, None)),
            Err(DispatchError::InvalidValue("ring components"))
        );
        assert_eq!(
            engine.validate(&request(0xFF, 100, None)),
            Ok(RingCommand::Start {
                components: RingComponents::from_bits(0b011),
                timeout_ds: 100,
                volume: RingVolume::Default,
            })
        );
    }

    #[test]
    fn stop_ignores_timeout_and_volume() {
        let engine = RingEngine::<Instant>::new(1, false);
        assert_eq!(engine.validate(&request(0, 0, Some(RingVolume::High))), Ok(RingCommand::Stop));
    }

    #[test]
    fn timeout_bounds() {
        let engine = RingEngine::<Instant>::new(1, false);
        assert!(engine.validate(&request(1, 0, None)).is_err());
        assert!(engine.validate(&request(1, 6001, None)).is_err());
        assert!(engine.validate(&request(1, 6000, None)).is_ok());
        assert!(engine.validate(&request(1, 1, None)).is_ok());
    }

    #[test]
    fn volume_requires_support() {
        let plain = RingEngine::<Instant>::new(1, false);
        assert!(plain.validate(&request(1, 10, Some(RingVolume::Default))).is_ok());
        assert_eq!(
            plain.validate(&request(1, 10, Some(RingVolume::Low))),
            Err(DispatchError::InvalidValue("ring volume"))
        );

        let with_volume = RingEngine::<Instant>::new(1, true);
        assert!(with_volume.validate(&request(1, 10, Some(RingVolume::High))).is_ok());
    }

    #[test]
    fn capability_counts_resolved_components() {
        let engine = RingEngine::<Instant>::new(1, false);
        assert!(engine.exceeds_capability(RingComponents::from_bits(0b111)));
        assert!(!engine.exceeds_capability(RingComponents::ALL));
        assert!(!engine.exceeds_capability(RingComponents::NONE));
    }

    #[test]
    fn start_then_timeout() {
        let mut engine = RingEngine::new(1, false);
        let t0 = Instant::now();
        let command = engine.validate(&request(1, 50, None)).unwrap();

        let transition = engine.apply(command, t0);
        assert_eq!(transition.change.state, RingStateCode::Started);
        assert!(matches!(transition.sound, Some(SoundCommand::Start { .. })));
        assert_eq!(engine.status(t0 + Duration::from_secs(2)).remaining_ds, 30);

        assert_eq!(engine.poll_timeout(t0 + Duration::from_secs(4)), None);
        let change = engine.poll_timeout(t0 + Duration::from_secs(5)).unwrap();
        assert_eq!(change.state, RingStateCode::StoppedByTimeout);
        assert!(!engine.is_ringing());
        assert_eq!(engine.next_deadline(), None);
    }

    #[test]
    fn local_button_stops_wireless_ring() {
        let mut engine = RingEngine::new(1, false);
        let t0 = Instant::now();
        engine.apply(RingCommand::Start {
            components: RingComponents::RIGHT,
            timeout_ds: 100,
            volume: RingVolume::Default,
        }, t0);

        let change = engine.local_event(LocalRingEvent::StoppedByButton, t0);
        assert_eq!(change.state, RingStateCode::StoppedByButton);
        assert_eq!(engine.status(t0).components, RingComponents::NONE);
    }

    #[test]
    fn local_start_timeout_is_clamped() {
        let mut engine = RingEngine::<Instant>::new(1, false);
        let t0 = Instant::now();

        let started = LocalRingEvent::Started { components: RingComponents::RIGHT, timeout_ds: 0 };
        assert_eq!(engine.local_event(started, t0).remaining_ds, 1);
        assert!(engine.is_ringing());

        let started = LocalRingEvent::Started { components: RingComponents::RIGHT, timeout_ds: u16::MAX };
        assert_eq!(engine.local_event(started, t0).remaining_ds, MAX_RING_TIMEOUT_DS);
        assert_eq!(engine.status(t0).remaining_ds, MAX_RING_TIMEOUT_DS);
        assert!(engine.poll_timeout(t0 + Duration::from_secs(599)).is_none());
        assert!(engine.poll_timeout(t0 + Duration::from_secs(600)).is_some());
    }

    #[test]
    fn context_released_only_by_owner() {
        let mut engine = RingEngine::<Instant>::new(1, false);
        engine.set_context(RingContext { connection: ConnectionId(1), nonce: [0; 8] });

        assert!(!engine.release_connection(ConnectionId(2)));
        assert!(engine.context().is_some());
        assert!(engine.release_connection(ConnectionId(1)));
        assert!(engine.context().is_none());
    }
}
