//! Single-task runtime that owns the accessory.
//!
//! Every core call happens on one tokio task, so commands, timer work and
//! local events are serialized without locks. Transports and device
//! drivers talk to the task through a [`RuntimeHandle`].
//!
//! ```text
//!  transport / buttons ──RuntimeEvent──┐
//!                                      ▼
//!                             ┌─────────────────┐   actions   ┌────────────┐
//!     next_deadline() ──────> │ AccessoryRuntime│ ──────────> │ ActionSink │
//!                             └─────────────────┘             └────────────┘
//! ```

use std::time::Duration;

use bytes::Bytes;
use fmdn_core::{
    Accessory, AccessoryAction, AccessoryConfig, AccountKey, BatteryLevel, ConnectionId,
    DispatchError, Environment, LocalRingEvent, Storage,
};
use fmdn_crypto::RustCryptoProvider;
use fmdn_proto::ACCOUNT_KEY_SIZE;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{error::RuntimeError, platform::DevicePlatform, sink::ActionSink, system_env::SystemEnv};

/// Accessory on production collaborators.
pub type DeviceAccessory<S> = Accessory<SystemEnv, S, RustCryptoProvider, DevicePlatform>;

/// Default depth of the runtime's event queue.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Input to the runtime task.
#[derive(Debug)]
pub enum RuntimeEvent {
    /// Transport connection established
    Connected(ConnectionId),
    /// Transport connection closed
    Disconnected(ConnectionId),
    /// Transport read of the challenge characteristic
    ReadChallenge {
        /// Reading connection
        connection: ConnectionId,
        /// Encoded challenge
        reply: oneshot::Sender<Result<Bytes, DispatchError>>,
    },
    /// Transport write of a command frame
    Write {
        /// Writing connection
        connection: ConnectionId,
        /// Raw command frame
        frame: Bytes,
        /// Outcome reported back to the transport
        reply: oneshot::Sender<Result<(), DispatchError>>,
    },
    /// Ring state changed by a local source
    LocalRing(LocalRingEvent),
    /// Battery bucket changed
    BatteryChanged(BatteryLevel),
    /// User opened the consent window for this long
    ConsentGranted(Duration),
    /// Pairing delivered an account key
    AddAccountKey([u8; ACCOUNT_KEY_SIZE]),
    /// Erase all keys
    FactoryReset,
    /// Stop the task
    Shutdown,
}

/// Owner of the accessory and its side-effect sink.
pub struct AccessoryRuntime<S: Storage, K: ActionSink> {
    accessory: DeviceAccessory<S>,
    platform: DevicePlatform,
    env: SystemEnv,
    sink: K,
}

impl<S: Storage, K: ActionSink> AccessoryRuntime<S, K> {
    /// Restore the accessory from `storage`.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Accessory` if the configuration is invalid or the
    ///   persisted records are corrupted
    pub fn new(config: AccessoryConfig, storage: S, sink: K) -> Result<Self, RuntimeError> {
        let env = SystemEnv::new();
        let platform = DevicePlatform::new();
        let accessory = Accessory::new(
            config,
            env.clone(),
            storage,
            RustCryptoProvider::new(),
            platform.clone(),
        )?;
        Ok(Self { accessory, platform, env, sink })
    }

    /// The accessory, for inspection before the task starts.
    pub fn accessory(&self) -> &DeviceAccessory<S> {
        &self.accessory
    }

    /// Admit an account key before the task starts.
    pub fn add_account_key(&mut self, key: [u8; ACCOUNT_KEY_SIZE]) -> AccountKey {
        self.accessory.add_account_key(key)
    }

    /// Start the task.
    pub fn spawn(self, capacity: usize) -> (RuntimeHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let task = tokio::spawn(self.run(rx));
        (RuntimeHandle { tx }, task)
    }

    /// Serve events and timer deadlines until shutdown or until every
    /// handle is dropped.
    pub async fn run(mut self, mut events: mpsc::Receiver<RuntimeEvent>) {
        let env = self.env.clone();
        tracing::info!(
            provisioned = self.accessory.is_provisioned(),
            account_keys = self.accessory.key_store().count(),
            "accessory runtime started"
        );

        loop {
            let now = env.now();
            let deadline = self.accessory.next_deadline();
            let wait = if deadline > now { deadline - now } else { Duration::ZERO };

            tokio::select! {
                event = events.recv() => match event {
                    Some(RuntimeEvent::Shutdown) | None => break,
                    Some(event) => self.handle(event),
                },
                () = env.sleep(wait) => {
                    let actions = self.accessory.tick();
                    self.execute(actions);
                },
            }
        }

        tracing::info!("accessory runtime stopped");
    }

    fn handle(&mut self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::Connected(connection) => self.accessory.connect(connection),
            RuntimeEvent::Disconnected(connection) => {
                self.accessory.disconnect(connection);
            },
            RuntimeEvent::ReadChallenge { connection, reply } => {
                let _ = reply.send(self.accessory.read_challenge(connection));
            },
            RuntimeEvent::Write { connection, frame, reply } => {
                let result = match self.accessory.write_command(connection, &frame) {
                    Ok(actions) => {
                        self.execute(actions);
                        Ok(())
                    },
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            },
            RuntimeEvent::LocalRing(event) => {
                let actions = self.accessory.local_ring(event);
                self.execute(actions);
            },
            RuntimeEvent::BatteryChanged(level) => {
                self.platform.set_battery(level);
                let actions = self.accessory.battery_changed();
                self.execute(actions);
            },
            RuntimeEvent::ConsentGranted(window) => self.platform.grant_consent(window),
            RuntimeEvent::AddAccountKey(key) => {
                self.accessory.add_account_key(key);
            },
            RuntimeEvent::FactoryReset => {
                let actions = self.accessory.factory_reset();
                self.execute(actions);
            },
            RuntimeEvent::Shutdown => {},
        }
    }

    fn execute(&mut self, actions: Vec<AccessoryAction>) {
        for action in actions {
            self.sink.execute(action);
        }
    }
}

/// Cloneable handle for talking to the runtime task.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl RuntimeHandle {
    /// Register a connection.
    pub async fn connect(&self, connection: ConnectionId) -> Result<(), RuntimeError> {
        self.send(RuntimeEvent::Connected(connection)).await
    }

    /// Drop a connection.
    pub async fn disconnect(&self, connection: ConnectionId) -> Result<(), RuntimeError> {
        self.send(RuntimeEvent::Disconnected(connection)).await
    }

    /// Read a fresh challenge.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Dispatch` for an unknown connection
    /// - `RuntimeError::Closed` if the task has stopped
    pub async fn read_challenge(&self, connection: ConnectionId) -> Result<Bytes, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(RuntimeEvent::ReadChallenge { connection, reply }).await?;
        Ok(rx.await.map_err(|_| RuntimeError::Closed)??)
    }

    /// Write a command frame. The response arrives through the sink.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Dispatch` carrying the rejection
    /// - `RuntimeError::Closed` if the task has stopped
    pub async fn write(&self, connection: ConnectionId, frame: Bytes) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(RuntimeEvent::Write { connection, frame, reply }).await?;
        Ok(rx.await.map_err(|_| RuntimeError::Closed)??)
    }

    /// Report a local ring state change.
    pub async fn local_ring(&self, event: LocalRingEvent) -> Result<(), RuntimeError> {
        self.send(RuntimeEvent::LocalRing(event)).await
    }

    /// Report a new battery bucket.
    pub async fn battery_changed(&self, level: BatteryLevel) -> Result<(), RuntimeError> {
        self.send(RuntimeEvent::BatteryChanged(level)).await
    }

    /// Open the consent window.
    pub async fn grant_consent(&self, window: Duration) -> Result<(), RuntimeError> {
        self.send(RuntimeEvent::ConsentGranted(window)).await
    }

    /// Admit an account key.
    pub async fn add_account_key(&self, key: [u8; ACCOUNT_KEY_SIZE]) -> Result<(), RuntimeError> {
        self.send(RuntimeEvent::AddAccountKey(key)).await
    }

    /// Erase all keys.
    pub async fn factory_reset(&self) -> Result<(), RuntimeError> {
        self.send(RuntimeEvent::FactoryReset).await
    }

    /// Stop the task.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.send(RuntimeEvent::Shutdown).await
    }

    async fn send(&self, event: RuntimeEvent) -> Result<(), RuntimeError> {
        self.tx.send(event).await.map_err(|_| RuntimeError::Closed)
    }
}
