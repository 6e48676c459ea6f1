//! Test bench wiring an accessory to simulated collaborators.

use std::time::Duration;

use bytes::Bytes;
use fmdn_core::{
    Accessory, AccessoryAction, AccessoryConfig, AccessoryError, ConnectionId, DispatchError,
    MemoryStorage, Storage,
};
use fmdn_crypto::RustCryptoProvider;
use fmdn_proto::{EcCurve, NONCE_SIZE};

use crate::{peer::challenge_nonce, sim_env::SimEnv, sim_platform::SimPlatform};

/// Accessory running on simulated collaborators.
pub type SimAccessory<S = MemoryStorage> = Accessory<SimEnv, S, RustCryptoProvider, SimPlatform>;

/// Configuration used by benches: the software provider supports only
/// secp256r1.
pub fn bench_config() -> AccessoryConfig {
    AccessoryConfig { curve: EcCurve::Secp256r1, ..AccessoryConfig::default() }
}

/// Outcome of one challenge/write exchange.
#[derive(Debug)]
pub struct Exchange {
    /// Nonce of the challenge the write consumed
    pub nonce: [u8; NONCE_SIZE],
    /// Dispatch result
    pub result: Result<Vec<AccessoryAction>, DispatchError>,
}

impl Exchange {
    /// Encoded response notified to `connection`, if the write succeeded.
    pub fn response_to(&self, connection: ConnectionId) -> Option<Bytes> {
        self.actions().iter().find_map(|action| match action {
            AccessoryAction::Notify { connection: target, frame } if *target == connection => {
                Some(frame.clone())
            },
            _ => None,
        })
    }

    /// Side effects of a successful write, empty on failure.
    pub fn actions(&self) -> &[AccessoryAction] {
        self.result.as_deref().unwrap_or_default()
    }
}

/// An accessory plus handles on its simulated collaborators.
pub struct Bench<S: Storage = MemoryStorage> {
    /// Shared virtual clock and RNG
    pub env: SimEnv,
    /// Consent and battery controls
    pub platform: SimPlatform,
    /// Storage handle shared with the accessory
    pub storage: S,
    /// The accessory under test
    pub accessory: SimAccessory<S>,
    config: AccessoryConfig,
}

impl Bench<MemoryStorage> {
    /// Bench with the default bench configuration and fresh storage.
    pub fn new(seed: u64) -> Result<Self, AccessoryError> {
        Self::with_storage(bench_config(), MemoryStorage::new(), seed)
    }
}

impl<S: Storage> Bench<S> {
    /// Bench over `storage`, which may already hold records.
    pub fn with_storage(config: AccessoryConfig, storage: S, seed: u64) -> Result<Self, AccessoryError> {
        let env = SimEnv::with_seed(seed);
        let platform = SimPlatform::new();
        let accessory = Accessory::new(
            config.clone(),
            env.clone(),
            storage.clone(),
            RustCryptoProvider::new(),
            platform.clone(),
        )?;
        Ok(Self { env, platform, storage, accessory, config })
    }

    /// Rebuild the accessory from storage, as after a reboot. Virtual time
    /// keeps running.
    pub fn restart(&mut self) -> Result<(), AccessoryError> {
        self.accessory = Accessory::new(
            self.config.clone(),
            self.env.clone(),
            self.storage.clone(),
            RustCryptoProvider::new(),
            self.platform.clone(),
        )?;
        Ok(())
    }

    /// Register `connection`.
    pub fn connect(&mut self, connection: ConnectionId) {
        self.accessory.connect(connection);
    }

    /// Read a challenge on `connection` and return its nonce.
    pub fn challenge(&mut self, connection: ConnectionId) -> Result<[u8; NONCE_SIZE], DispatchError> {
        let bytes = self.accessory.read_challenge(connection)?;
        challenge_nonce(&bytes).ok_or(DispatchError::UnknownConnection(connection))
    }

    /// Read a challenge, build the command for its nonce and write it.
    pub fn exchange(
        &mut self,
        connection: ConnectionId,
        build: impl FnOnce(&[u8; NONCE_SIZE]) -> Vec<u8>,
    ) -> Result<Exchange, DispatchError> {
        let nonce = self.challenge(connection)?;
        let frame = build(&nonce);
        let result = self.accessory.write_command(connection, &frame);
        Ok(Exchange { nonce, result })
    }

    /// Advance virtual time and run the accessory's timer work.
    pub fn advance(&mut self, duration: Duration) -> Vec<AccessoryAction> {
        self.env.advance(duration);
        self.accessory.tick()
    }

    /// Jump to the next deadline and run the timer work there.
    pub fn run_next_deadline(&mut self) -> Vec<AccessoryAction> {
        self.env.advance_to(self.accessory.next_deadline());
        self.accessory.tick()
    }
}
