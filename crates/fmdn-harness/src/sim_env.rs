//! Simulated environment: virtual clock and seeded RNG.
//!
//! Time only moves when the test advances it, and every random byte comes
//! from a ChaCha stream seeded by the test, so a run is reproducible from its
//! seed.

#![allow(clippy::disallowed_types, reason = "Shared virtual clock and RNG state")]

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex},
    time::Duration,
};

use fmdn_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Virtual instant: time elapsed since the simulation started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since simulation start.
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

struct SimState {
    now: SimInstant,
    rng: ChaCha8Rng,
}

/// Deterministic environment shared by every clone.
#[derive(Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Environment at time zero with RNG seeded from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                now: SimInstant::default(),
                rng: ChaCha8Rng::seed_from_u64(seed),
            })),
        }
    }

    /// Move virtual time forward.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.lock();
        state.now = state.now + duration;
        tracing::trace!(elapsed_ms = state.now.since_start().as_millis() as u64, "virtual time advanced");
    }

    /// Move virtual time to `instant` if it lies in the future.
    pub fn advance_to(&self, instant: SimInstant) {
        let mut state = self.lock();
        if instant > state.now {
            state.now = instant;
        }
    }

    /// Time since simulation start.
    pub fn elapsed(&self) -> Duration {
        self.lock_now().since_start()
    }

    fn lock_now(&self) -> SimInstant {
        self.lock().now
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().expect("SimEnv mutex poisoned")
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        self.lock_now()
    }

    /// Completes immediately after advancing virtual time.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }
}
