//! Runtime error types.

use fmdn_core::{AccessoryError, DispatchError, StorageError};
use thiserror::Error;

/// Errors from the accessory runtime and its handle.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Invalid command-line or startup configuration.
    ///
    /// Fatal: fix the configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// The record database could not be opened.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The accessory refused to come up (invalid config, corrupted records).
    #[error("accessory error: {0}")]
    Accessory(#[from] AccessoryError),

    /// A command was rejected. Carries the code reported to the peer.
    #[error("command rejected: {0}")]
    Dispatch(#[from] DispatchError),

    /// The runtime task has stopped.
    #[error("runtime stopped")]
    Closed,

    /// Console or stream I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
