//! Sans-IO core of an FMDN accessory.
//!
//! State machines for everything an accessory decides on its own: which
//! peer may read or rotate its identity, when the public identifier changes,
//! whether to ring, and which account keys to keep. The driver feeds in
//! transport reads/writes, connection events and timer ticks; the core
//! answers with [`AccessoryAction`] values and never touches a radio, a
//! speaker or a socket.
//!
//! # Architecture
//!
//! ```text
//!                   ┌────────────────────────────────────────┐
//!  read/write ────> │ Accessory                              │ ──> AccessoryAction
//!  connect/tick     │  ├─ ConnectionTable (nonce per link)   │
//!                   │  ├─ KeyStore ─────────┐                │
//!                   │  ├─ IdentityEngine ───┼──> Storage     │
//!                   │  ├─ BeaconClock ──────┘                │
//!                   │  └─ RingEngine                         │
//!                   └────────────────────────────────────────┘
//!                         │ CryptoProvider   │ Platform
//! ```
//!
//! Time and randomness come from an [`Environment`], so simulation runs are
//! deterministic and reproducible from a seed.

#![forbid(unsafe_code)]

pub mod accessory;
pub mod auth;
pub mod clock;
pub mod config;
pub mod connection;
pub mod env;
pub mod error;
pub mod identity;
pub mod key_store;
pub mod platform;
pub mod ring;
pub mod storage;

pub use accessory::{Accessory, AccessoryAction};
pub use config::AccessoryConfig;
pub use connection::ConnectionId;
pub use env::Environment;
pub use error::{AccessoryError, AuthFailure, DispatchError, KeyStoreError};
pub use identity::{Advertisement, IdentityEngine, UtpState};
pub use key_store::{AccountKey, KeyStore};
pub use platform::{BatteryLevel, Platform};
pub use ring::{LocalRingEvent, RingContext, RingEngine};
pub use storage::{ChaoticStorage, MemoryStorage, RecordKey, Storage, StorageError};
