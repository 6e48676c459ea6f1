//! Beacon clock: seconds since provisioning time zero, monotonic across
//! reboots.
//!
//! The clock restarts from the last persisted checkpoint, so after a reboot
//! it may lag real time by up to one checkpoint interval but never runs
//! backwards. A failed checkpoint write is retried after a short delay.

use std::{
    ops::{Add, Sub},
    time::Duration,
};

use crate::{
    error::AccessoryError,
    storage::{RecordKey, Storage},
};

const CHECKPOINT_SIZE: usize = 4;

/// Seconds counter restored from storage and advanced by the monotonic
/// environment clock.
#[derive(Debug)]
pub struct BeaconClock<S, I> {
    storage: S,
    base_secs: u32,
    boot: I,
    interval: Duration,
    retry: Duration,
    next_checkpoint: I,
}

impl<S, I> BeaconClock<S, I>
where
    S: Storage,
    I: Copy + Ord + Sub<Output = Duration> + Add<Duration, Output = I>,
{
    /// Restore from the checkpoint record, absent meaning zero.
    ///
    /// # Errors
    ///
    /// - `AccessoryError::Corrupted` if the record is not 4 bytes
    /// - `AccessoryError::Storage` if the backend fails to read
    pub fn load(storage: S, now: I, interval: Duration, retry: Duration) -> Result<Self, AccessoryError> {
        let base_secs = match storage.get(RecordKey::ClockCheckpoint)? {
            Some(bytes) => {
                let raw: [u8; CHECKPOINT_SIZE] =
                    bytes.as_slice().try_into().map_err(|_| AccessoryError::Corrupted {
                        record: RecordKey::ClockCheckpoint.path(),
                        reason: format!("expected {CHECKPOINT_SIZE} bytes, found {}", bytes.len()),
                    })?;
                u32::from_be_bytes(raw)
            },
            None => 0,
        };

        tracing::debug!(base_secs, "beacon clock restored");
        Ok(Self { storage, base_secs, boot: now, interval, retry, next_checkpoint: now + interval })
    }

    /// Clock value at `now`.
    pub fn now_secs(&self, now: I) -> u32 {
        let elapsed = u32::try_from((now - self.boot).as_secs()).unwrap_or(u32::MAX);
        self.base_secs.saturating_add(elapsed)
    }

    /// Persist the clock if a checkpoint is due. Returns true if a write was
    /// attempted.
    pub fn poll_checkpoint(&mut self, now: I) -> bool {
        if now < self.next_checkpoint {
            return false;
        }

        let secs = self.now_secs(now);
        match self.storage.put(RecordKey::ClockCheckpoint, &secs.to_be_bytes()) {
            Ok(()) => {
                tracing::trace!(secs, "clock checkpoint written");
                self.next_checkpoint = now + self.interval;
            },
            Err(e) => {
                tracing::warn!(secs, error = %e, retry_secs = self.retry.as_secs(), "clock checkpoint failed");
                self.next_checkpoint = now + self.retry;
            },
        }
        true
    }

    /// When the next checkpoint is due.
    pub fn next_deadline(&self) -> I {
        self.next_checkpoint
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::storage::{ChaoticStorage, MemoryStorage};

    const HOUR: Duration = Duration::from_secs(3600);
    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn starts_from_checkpoint() {
        let storage = MemoryStorage::new();
        storage.insert_raw(RecordKey::ClockCheckpoint, 5000u32.to_be_bytes().to_vec());
        let t0 = Instant::now();

        let clock = BeaconClock::load(storage, t0, HOUR, MINUTE).unwrap();
        assert_eq!(clock.now_secs(t0), 5000);
        assert_eq!(clock.now_secs(t0 + Duration::from_millis(2500)), 5002);
    }

    #[test]
    fn rejects_malformed_checkpoint() {
        let storage = MemoryStorage::new();
        storage.insert_raw(RecordKey::ClockCheckpoint, vec![1, 2, 3]);
        assert!(matches!(
            BeaconClock::load(storage, Instant::now(), HOUR, MINUTE),
            Err(AccessoryError::Corrupted { .. })
        ));
    }

    #[test]
    fn checkpoint_survives_restart() {
        let storage = MemoryStorage::new();
        let t0 = Instant::now();
        let mut clock = BeaconClock::load(storage.clone(), t0, HOUR, MINUTE).unwrap();

        assert!(!clock.poll_checkpoint(t0 + MINUTE));
        assert!(clock.poll_checkpoint(t0 + HOUR));

        let restarted = BeaconClock::load(storage, t0, HOUR, MINUTE).unwrap();
        assert_eq!(restarted.now_secs(t0), 3600);
    }

    #[test]
    fn failed_checkpoint_retries_sooner() {
        let storage = ChaoticStorage::new(MemoryStorage::new(), 0.0);
        let t0 = Instant::now();
        let mut clock = BeaconClock::load(storage.clone(), t0, HOUR, MINUTE).unwrap();

        storage.set_writes_down(true);
        assert!(clock.poll_checkpoint(t0 + HOUR));
        assert_eq!(clock.next_deadline(), t0 + HOUR + MINUTE);

        storage.set_writes_down(false);
        assert!(clock.poll_checkpoint(t0 + HOUR + MINUTE));
        assert_eq!(clock.next_deadline(), t0 + 2 * HOUR + MINUTE);
        assert_eq!(
            storage.inner().get(RecordKey::ClockCheckpoint).unwrap(),
            Some(3660u32.to_be_bytes().to_vec())
        );
    }
}
