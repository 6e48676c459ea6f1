//! Deterministic simulation harness for FMDN accessory testing.
//!
//! Simulated implementations of the core's collaborators (environment,
//! platform) plus a peer that speaks the wire protocol, so whole
//! challenge/command/response exchanges run in-process and reproducibly.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference account key store. Operations are
//! applied to both the model and the real store, and their observable states
//! (keys by recency, owner) are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod peer;
pub mod scenario;
pub mod sim_env;
pub mod sim_platform;

pub use model::{KeyOp, KeyStoreModel, pool_key, store_by_recency};
pub use peer::{IdentityHolder, Peer, challenge_nonce, open_response, signed_command};
pub use scenario::{Bench, Exchange, SimAccessory, bench_config};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_platform::SimPlatform;
