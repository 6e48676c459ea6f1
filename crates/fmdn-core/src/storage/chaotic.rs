//! Chaotic storage wrapper for fault injection testing
//!
//! Randomly fails operations so tests can check that persistence failures
//! never corrupt in-memory state and that failed writes are retried.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use super::{RecordKey, Storage, StorageError};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but fails operations
/// with probability `failure_rate`. Reads can be exempted so that only
/// writes fail, which is what persistence retry tests need.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// Whether `get` is subject to injection
    fail_reads: bool,
    /// Hard switch that fails every write while set
    writes_down: Arc<AtomicBool>,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
}

/// Linear congruential generator so chaos is reproducible from a seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Create a new chaotic storage wrapper
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            fail_reads: false,
            writes_down: Arc::new(AtomicBool::new(false)),
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
        }
    }

    /// Also inject failures into reads.
    #[must_use]
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Fail every write until switched back. Shared by all clones.
    pub fn set_writes_down(&self, down: bool) {
        self.writes_down.store(down, Ordering::SeqCst);
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn should_fail(&self) -> bool {
        #[allow(clippy::expect_used)]
        let roll = self.rng.lock().expect("ChaoticRng mutex poisoned").next();
        roll < self.failure_rate
    }

    fn check_write(&self, key: RecordKey) -> Result<(), StorageError> {
        if self.writes_down.load(Ordering::SeqCst) || self.should_fail() {
            return Err(StorageError::Injected(key.path()));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn get(&self, key: RecordKey) -> Result<Option<Vec<u8>>, StorageError> {
        if self.fail_reads && self.should_fail() {
            return Err(StorageError::Injected(key.path()));
        }
        self.inner.get(key)
    }

    fn put(&self, key: RecordKey, value: &[u8]) -> Result<(), StorageError> {
        self.check_write(key)?;
        self.inner.put(key, value)
    }

    fn delete(&self, key: RecordKey) -> Result<(), StorageError> {
        self.check_write(key)?;
        self.inner.delete(key)
    }
}
