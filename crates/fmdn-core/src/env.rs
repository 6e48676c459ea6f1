//! Environment abstraction for deterministic testing.
//!
//! Decouples the accessory state machines from system resources (time,
//! randomness). Simulation supplies a manually advanced clock and a seeded
//! RNG; production supplies the OS clock and OS entropy.

use std::{
    ops::{Add, Sub},
    time::Duration,
};

/// Abstract environment providing time, randomness, and async primitives.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production;
///   challenge nonces are drawn from it
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    ///
    /// Production uses `std::time::Instant`; simulation uses a virtual
    /// instant advanced by the test.
    type Instant: Copy
        + Ord
        + Send
        + Sync
        + std::fmt::Debug
        + Sub<Output = Duration>
        + Add<Duration, Output = Self::Instant>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this; the state machines never do.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Uniform value in `1..=max`, or 0 when `max` is 0.
    ///
    /// Modulo bias is negligible for the small ranges used here (rotation
    /// jitter).
    fn random_in_range(&self, max: u64) -> u64 {
        if max == 0 { 0 } else { self.random_u64() % max + 1 }
    }
}
