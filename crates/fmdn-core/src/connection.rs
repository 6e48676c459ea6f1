//! Per-connection challenge state.
//!
//! Every transport read issues a fresh nonce and arms a one-shot challenge;
//! the next write consumes it whether or not that write succeeds.
//!
//! ```text
//! ┌──────┐   read    ┌─────────────────┐   write   ┌──────┐
//! │ Idle │──────────>│ ChallengeIssued │──────────>│ Idle │
//! └──────┘           └─────────────────┘           └──────┘
//!                        │   read (fresh nonce) ▲
//!                        └──────────────────────┘
//! ```

use std::{collections::HashMap, fmt};

use fmdn_proto::{Challenge, NONCE_SIZE};

use crate::error::AuthFailure;

/// Opaque transport connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Nonce and challenge flag of one connection.
#[derive(Debug, Clone, Default)]
struct NonceContext {
    nonce: [u8; NONCE_SIZE],
    challenge_valid: bool,
}

/// Table of live connections, created on connect and removed on disconnect.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    entries: HashMap<ConnectionId, NonceContext>,
}

impl ConnectionTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Re-registering resets its challenge state.
    pub fn connect(&mut self, id: ConnectionId) {
        self.entries.insert(id, NonceContext::default());
    }

    /// Remove a connection. Returns false if it was not registered.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store `nonce` as the connection's challenge and arm it.
    ///
    /// Returns `None` for an unknown connection.
    pub fn issue(&mut self, id: ConnectionId, nonce: [u8; NONCE_SIZE]) -> Option<Challenge> {
        let entry = self.entries.get_mut(&id)?;
        entry.nonce = nonce;
        entry.challenge_valid = true;
        Some(Challenge::new(nonce))
    }

    /// Consume the armed challenge and return its nonce.
    ///
    /// # Errors
    ///
    /// - `AuthFailure::NoChallenge` if the connection is unknown or its
    ///   challenge was never issued or already consumed
    pub fn consume(&mut self, id: ConnectionId) -> Result<[u8; NONCE_SIZE], AuthFailure> {
        let entry = self.entries.get_mut(&id).ok_or(AuthFailure::NoChallenge)?;
        if !entry.challenge_valid {
            return Err(AuthFailure::NoChallenge);
        }
        entry.challenge_valid = false;
        Ok(entry.nonce)
    }

    /// Whether `id` has an unconsumed challenge.
    pub fn has_challenge(&self, id: ConnectionId) -> bool {
        self.entries.get(&id).is_some_and(|entry| entry.challenge_valid)
    }
}
