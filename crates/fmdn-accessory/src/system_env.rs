//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` backs the accessory with the monotonic OS clock, OS entropy
//! for challenge nonces and rotation jitter, and tokio timers for the
//! runtime's deadline sleeps. Behavior is non-deterministic by nature.

use std::time::Duration;

use fmdn_core::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// # Security
///
/// Challenge nonces are drawn from getrandom, which provides OS-level
/// cryptographic randomness (e.g. /dev/urandom on Linux).
///
/// # Panics
///
/// Panics if the OS RNG fails. An accessory that cannot draw unpredictable
/// nonces would accept replayed commands, so it must not keep running.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - nonces would be predictable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::disallowed_methods)]
    fn time_advances() {
        let env = SystemEnv::new();

        let t1 = env.now();
        std::thread::sleep(Duration::from_millis(10));
        assert!(env.now() > t1);
    }

    #[test]
    fn random_bytes_differ() {
        let env = SystemEnv::new();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];

        env.random_bytes(&mut a);
        env.random_bytes(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn jitter_stays_in_range() {
        let env = SystemEnv::new();
        for _ in 0..100 {
            assert!((1..=204).contains(&env.random_in_range(204)));
        }
        assert_eq!(env.random_in_range(0), 0);
    }

    #[tokio::test]
    async fn sleep_waits() {
        let env = SystemEnv::new();

        let start = env.now();
        env.sleep(Duration::from_millis(50)).await;
        assert!(env.now() - start >= Duration::from_millis(50));
    }
}
