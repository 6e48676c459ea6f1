//! The accessory aggregate.
//!
//! Owns every engine (key store, identity, ring, clock) and the connection
//! table, and exposes the operations a transport driver calls. Nothing here
//! performs I/O beyond the synchronous [`Storage`] seam: radio, sound and
//! notification effects are returned as [`AccessoryAction`] values for the
//! driver to execute in order.
//!
//! All calls must be serialized by the driver. Timer work (rotation, ring
//! timeout, clock checkpoint) runs in [`Accessory::tick`], which the driver
//! invokes when [`Accessory::next_deadline`] passes.

mod dispatch;

use std::time::Duration;

use bytes::Bytes;
use fmdn_crypto::{CryptoProvider, KeyPurpose, ROTATION_PERIOD_SECS};
use fmdn_proto::{
    ACCOUNT_KEY_SIZE, NONCE_SIZE, Opcode,
    payloads::{RingComponents, RingStateChange, RingVolume},
};

use crate::{
    auth::{purpose_key, signed_response},
    clock::BeaconClock,
    config::AccessoryConfig,
    connection::{ConnectionId, ConnectionTable},
    env::Environment,
    error::{AccessoryError, DispatchError},
    identity::{Advertisement, IdentityEngine},
    key_store::{AccountKey, KeyStore},
    platform::Platform,
    ring::{LocalRingEvent, RingEngine, SoundCommand},
    storage::Storage,
};

/// Side effect for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessoryAction {
    /// Send a notification on a connection
    Notify {
        /// Target connection
        connection: ConnectionId,
        /// Encoded response frame
        frame: Bytes,
    },

    /// Publish a new identifier and flags byte
    UpdateAdvertising {
        /// Ephemeral identifier
        eid: Vec<u8>,
        /// Hashed flags byte
        hashed_flags: u8,
        /// Whether the link-layer address must change
        rotate_address: bool,
    },

    /// Stop advertising the identifier
    StopAdvertising,

    /// Start the sound actuator
    StartSound {
        /// Components to drive
        components: RingComponents,
        /// Volume
        volume: RingVolume,
        /// Play duration
        timeout: Duration,
    },

    /// Stop the sound actuator
    StopSound,

    /// Provisioning state changed
    ProvisioningChanged {
        /// New state
        provisioned: bool,
    },

    /// A peer read the beacon parameters, including the clock
    ClockSynced,

    /// Ring state changed, whatever the source
    RingStateChanged(RingStateChange),
}

impl From<Advertisement> for AccessoryAction {
    fn from(advertisement: Advertisement) -> Self {
        Self::UpdateAdvertising {
            eid: advertisement.eid,
            hashed_flags: advertisement.hashed_flags,
            rotate_address: advertisement.rotate_address,
        }
    }
}

impl From<SoundCommand> for AccessoryAction {
    fn from(command: SoundCommand) -> Self {
        match command {
            SoundCommand::Start { components, volume, timeout } => {
                Self::StartSound { components, volume, timeout }
            },
            SoundCommand::Stop => Self::StopSound,
        }
    }
}

/// An FMDN accessory.
///
/// Built in one step from its collaborators. Generic over the environment
/// (time, randomness), storage backend, crypto provider and platform.
pub struct Accessory<E, S, C, P>
where
    E: Environment,
    S: Storage,
    C: CryptoProvider,
    P: Platform,
{
    config: AccessoryConfig,
    env: E,
    crypto: C,
    platform: P,
    keys: KeyStore<S>,
    identity: IdentityEngine<S>,
    ring: RingEngine<E::Instant>,
    clock: BeaconClock<S, E::Instant>,
    connections: ConnectionTable,
    /// Next rotation tick; `None` while unprovisioned
    next_rotation: Option<E::Instant>,
    /// Whether the driver has been told to advertise the identifier
    advertising: bool,
}

impl<E, S, C, P> Accessory<E, S, C, P>
where
    E: Environment,
    S: Storage,
    C: CryptoProvider,
    P: Platform,
{
    /// Validate `config` and restore persisted state.
    ///
    /// A provisioned accessory derives its identifier here and starts
    /// advertising it on the first [`Accessory::tick`].
    ///
    /// # Errors
    ///
    /// - `AccessoryError::InvalidConfig` for an out-of-range setting or a
    ///   curve `crypto` cannot compute
    /// - `AccessoryError::KeyStore` or `AccessoryError::Corrupted` if a
    ///   persisted record fails validation
    /// - `AccessoryError::Storage` if the backend cannot be read
    pub fn new(
        config: AccessoryConfig,
        env: E,
        storage: S,
        crypto: C,
        platform: P,
    ) -> Result<Self, AccessoryError> {
        config.validate()?;
        if !crypto.supports(config.curve) {
            return Err(AccessoryError::InvalidConfig {
                field: "curve",
                reason: format!("{:?} is not supported by the crypto provider", config.curve),
            });
        }
        let now = env.now();

        let keys = KeyStore::load(storage.clone(), config.max_account_keys)?;
        let mut identity =
            IdentityEngine::load(storage.clone(), config.curve, config.utp_rotation_windows)?;
        let clock = BeaconClock::load(
            storage,
            now,
            config.clock_checkpoint_interval,
            config.clock_checkpoint_retry,
        )?;
        if let Err(e) = identity.restore(clock.now_secs(now), &crypto) {
            tracing::error!(error = %e, "identifier not restored, deriving on first tick");
        }
        let ring = RingEngine::new(config.ring_components, config.volume_control);
        let next_rotation = identity.is_provisioned().then_some(now);

        tracing::info!(
            curve = ?config.curve,
            account_keys = keys.count(),
            provisioned = identity.is_provisioned(),
            "accessory ready"
        );

        Ok(Self {
            config,
            env,
            crypto,
            platform,
            keys,
            identity,
            ring,
            clock,
            connections: ConnectionTable::new(),
            next_rotation,
            advertising: false,
        })
    }

    /// Register a transport connection.
    pub fn connect(&mut self, connection: ConnectionId) {
        self.connections.connect(connection);
        tracing::debug!(%connection, "connected");
    }

    /// Drop a connection's challenge state and, if it owns the ring
    /// interaction, the ring context. Returns false for an unknown
    /// connection.
    pub fn disconnect(&mut self, connection: ConnectionId) -> bool {
        let known = self.connections.disconnect(connection);
        if self.ring.release_connection(connection) {
            tracing::debug!(%connection, "ring context released");
        }
        tracing::debug!(%connection, known, "disconnected");
        known
    }

    /// Transport read: issue a fresh challenge and return its encoding.
    ///
    /// # Errors
    ///
    /// - `DispatchError::UnknownConnection` if `connection` is not registered
    pub fn read_challenge(&mut self, connection: ConnectionId) -> Result<Bytes, DispatchError> {
        let mut nonce = [0u8; NONCE_SIZE];
        self.env.random_bytes(&mut nonce);

        let challenge = self
            .connections
            .issue(connection, nonce)
            .ok_or(DispatchError::UnknownConnection(connection))?;
        tracing::debug!(%connection, "challenge issued");
        Ok(challenge.encode())
    }

    /// Run due timer work: ring timeout, identifier rotation, clock
    /// checkpoint, and pending identity key writes. The first tick after a
    /// restart announces the restored identifier.
    pub fn tick(&mut self) -> Vec<AccessoryAction> {
        let now = self.env.now();
        let mut actions = Vec::new();

        self.identity.retry_persist();

        if let Some(change) = self.ring.poll_timeout(now) {
            actions.push(AccessoryAction::StopSound);
            self.push_ring_change(change, &mut actions);
        }

        if self.next_rotation.is_some_and(|at| at <= now) {
            let clock = self.clock.now_secs(now);
            match self.identity.rotate(clock, false, &self.crypto, self.platform.battery_level()) {
                Ok(Some(advertisement)) => actions.push(advertisement.into()),
                Ok(None) => {},
                Err(e) => tracing::error!(error = %e, clock, "rotation failed, keeping identifier"),
            }
            self.schedule_rotation(now);
        }

        self.track_advertising(&actions);
        if !self.advertising
            && let Some(advertisement) =
                self.identity.announcement(self.platform.battery_level())
        {
            actions.push(advertisement.into());
            self.advertising = true;
        }

        self.clock.poll_checkpoint(now);
        actions
    }

    /// Earliest instant at which [`Accessory::tick`] has work.
    pub fn next_deadline(&self) -> E::Instant {
        [self.next_rotation, self.ring.next_deadline()]
            .into_iter()
            .flatten()
            .fold(self.clock.next_deadline(), std::cmp::min)
    }

    /// Reconcile a ring state change from a local source and notify the
    /// ring owner, if any.
    pub fn local_ring(&mut self, event: LocalRingEvent) -> Vec<AccessoryAction> {
        let change = self.ring.local_event(event, self.env.now());
        let mut actions = Vec::new();
        self.push_ring_change(change, &mut actions);
        actions
    }

    /// Republish the flags byte after the battery bucket changed.
    pub fn battery_changed(&mut self) -> Vec<AccessoryAction> {
        let actions: Vec<_> = self
            .identity
            .advertisement(self.platform.battery_level())
            .map(AccessoryAction::from)
            .into_iter()
            .collect();
        self.track_advertising(&actions);
        actions
    }

    /// Admit an account key delivered by the pairing flow.
    pub fn add_account_key(&mut self, key: [u8; ACCOUNT_KEY_SIZE]) -> AccountKey {
        self.keys.save(key)
    }

    /// Erase every account key and the identity key.
    pub fn factory_reset(&mut self) -> Vec<AccessoryAction> {
        tracing::info!("factory reset");
        self.keys.clear();
        let mut actions = Vec::new();
        self.unprovision(&mut actions);
        self.track_advertising(&actions);
        actions
    }

    /// Configuration the accessory was built with.
    pub fn config(&self) -> &AccessoryConfig {
        &self.config
    }

    /// Account key store.
    pub fn key_store(&self) -> &KeyStore<S> {
        &self.keys
    }

    /// Identity engine.
    pub fn identity(&self) -> &IdentityEngine<S> {
        &self.identity
    }

    /// Ring engine.
    pub fn ring(&self) -> &RingEngine<E::Instant> {
        &self.ring
    }

    /// Beacon clock in seconds.
    pub fn clock_secs(&self) -> u32 {
        self.clock.now_secs(self.env.now())
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// True while an identity key is set.
    pub fn is_provisioned(&self) -> bool {
        self.identity.is_provisioned()
    }

    fn schedule_rotation(&mut self, now: E::Instant) {
        let jitter = self.env.random_in_range(self.config.rotation_jitter_max_secs);
        let delay = Duration::from_secs(u64::from(ROTATION_PERIOD_SECS) + jitter);
        self.next_rotation = Some(now + delay);
        tracing::trace!(delay_secs = delay.as_secs(), "next rotation scheduled");
    }

    fn track_advertising(&mut self, actions: &[AccessoryAction]) {
        for action in actions {
            match action {
                AccessoryAction::UpdateAdvertising { .. } => self.advertising = true,
                AccessoryAction::StopAdvertising => self.advertising = false,
                _ => {},
            }
        }
    }

    fn unprovision(&mut self, actions: &mut Vec<AccessoryAction>) {
        self.ring.clear_context();
        self.next_rotation = None;
        if self.identity.unprovision() {
            actions.push(AccessoryAction::StopAdvertising);
            actions.push(AccessoryAction::ProvisioningChanged { provisioned: false });
        }
    }

    /// Report a ring state change and notify the ring owner with a tag
    /// under the ring key and the owner's authorizing nonce.
    fn push_ring_change(&self, change: RingStateChange, actions: &mut Vec<AccessoryAction>) {
        actions.push(AccessoryAction::RingStateChanged(change));

        let Some(context) = self.ring.context() else {
            return;
        };
        let Ok(key) = purpose_key(self.identity.identity_key(), KeyPurpose::Ring) else {
            return;
        };

        let frame = signed_response(
            key.as_bytes(),
            &context.nonce,
            Opcode::Ring,
            change.encode().to_vec(),
        )
        .and_then(|response| response.encode());
        match frame {
            Ok(frame) => {
                tracing::debug!(connection = %context.connection, state = ?change.state, "ring state notified");
                actions.push(AccessoryAction::Notify { connection: context.connection, frame });
            },
            Err(e) => tracing::warn!(error = %e, "ring notification not encodable"),
        }
    }
}
