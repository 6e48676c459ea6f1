//! FMDN accessory runtime.
//!
//! Production glue around [`fmdn_core`]'s sans-IO accessory: the OS clock
//! and RNG, a durable record store, and a single tokio task that owns the
//! accessory and executes its actions.
//!
//! # Components
//!
//! - [`AccessoryRuntime`]: task that serializes commands, timers and local
//!   events
//! - [`RuntimeHandle`]: cloneable sender used by transports and drivers
//! - [`ActionSink`]: radio and actuator operations; [`LoggingSink`] logs them
//! - [`RedbStorage`]: durable record storage
//! - [`DevicePlatform`]: consent window and battery bucket
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod console;
mod error;
mod platform;
mod runtime;
mod sink;
pub mod storage;
mod system_env;

pub use error::RuntimeError;
pub use platform::{DEFAULT_CONSENT_WINDOW, DevicePlatform};
pub use runtime::{
    AccessoryRuntime, DEFAULT_EVENT_CAPACITY, DeviceAccessory, RuntimeEvent, RuntimeHandle,
};
pub use sink::{ActionSink, LoggingSink};
pub use storage::RedbStorage;
pub use system_env::SystemEnv;
