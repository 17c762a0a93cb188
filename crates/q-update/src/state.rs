// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Persisted update state
//!
//! Two small JSON records outlive every reset:
//!
//! - [`InstalledVersionRecord`] (`/installed.json`): version in `current`
//!   and the release most recently rolled away from.
//! - [`BootAttemptState`] (`/boot_attempts.json`): launches not yet
//!   confirmed by the application.
//!
//! Both are replaced with [`atomic_write`], so a reset during an update
//! leaves the old or the new record, never a torn one. A missing record
//! reads as the default; an unparseable one is reported as
//! `StorageCorrupted` and the caller decides whether to fall back.

use q_common::constants::{BOOT_ATTEMPTS_PATH, INSTALLED_RECORD_PATH};
use q_common::{BootConfig, Error, Version};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::storage::{atomic_write, Storage};

fn load_json<T, S>(storage: &S, path: &str) -> Result<Option<T>, Error>
where
    T: DeserializeOwned,
    S: Storage + ?Sized,
{
    if !storage.exists(path) {
        return Ok(None);
    }
    let data = storage.read(path)?;
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|_| Error::StorageCorrupted)
}

fn save_json<T, S>(storage: &mut S, path: &str, value: &T) -> Result<(), Error>
where
    T: Serialize,
    S: Storage + ?Sized,
{
    let data = serde_json::to_vec(value).map_err(|_| Error::InternalError)?;
    atomic_write(storage, path, &data)
}

// ============================================================================
// Installed Version
// ============================================================================

/// Version occupying `current`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstalledVersionRecord {
    /// Installed release (`0.0.0` before the first update)
    pub version: Version,
    /// Release rolled back from; not offered again until a newer one ships
    #[serde(default)]
    pub rejected: Option<Version>,
}

impl InstalledVersionRecord {
    /// Read the record, defaulting when absent
    ///
    /// # Errors
    ///
    /// `StorageCorrupted` for an unparseable record, or a read error.
    pub fn load<S: Storage + ?Sized>(storage: &S) -> Result<Self, Error> {
        Ok(load_json(storage, INSTALLED_RECORD_PATH)?.unwrap_or_default())
    }

    /// Replace the record
    ///
    /// # Errors
    ///
    /// Storage write or rename failures.
    pub fn save<S: Storage + ?Sized>(&self, storage: &mut S) -> Result<(), Error> {
        save_json(storage, INSTALLED_RECORD_PATH, self)
    }

    /// Check whether `candidate` should be installed over this record
    ///
    /// True only for a strictly newer release that is not the rejected one.
    #[must_use]
    pub fn accepts(&self, candidate: &Version) -> bool {
        candidate.is_greater_than(&self.version) && self.rejected.as_ref() != Some(candidate)
    }

    /// Record a newly promoted release
    ///
    /// A rejection older than or equal to the new release no longer applies.
    pub fn promoted(&mut self, version: Version) {
        self.version = version;
        if self.rejected.is_some_and(|r| r <= version) {
            self.rejected = None;
        }
    }
}

// ============================================================================
// Boot Attempts
// ============================================================================

/// Unconfirmed launch counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootAttemptState {
    /// Launches since the application last confirmed a healthy boot
    pub pending_count: u32,
    /// Count at which the next boot rolls back
    pub threshold: u32,
}

impl Default for BootAttemptState {
    fn default() -> Self {
        Self::new(BootConfig::DEFAULT.rollback_threshold)
    }
}

impl BootAttemptState {
    /// Fresh counter; a zero threshold is treated as one
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            pending_count: 0,
            threshold: threshold.max(1),
        }
    }

    /// Read the counter, applying `threshold` from the running configuration
    ///
    /// # Errors
    ///
    /// `StorageCorrupted` for an unparseable record, or a read error.
    pub fn load<S: Storage + ?Sized>(storage: &S, threshold: u32) -> Result<Self, Error> {
        let stored: Option<Self> = load_json(storage, BOOT_ATTEMPTS_PATH)?;
        let mut state = Self::new(threshold);
        if let Some(stored) = stored {
            state.pending_count = stored.pending_count;
        }
        Ok(state)
    }

    /// Replace the record
    ///
    /// # Errors
    ///
    /// Storage write or rename failures.
    pub fn save<S: Storage + ?Sized>(&self, storage: &mut S) -> Result<(), Error> {
        save_json(storage, BOOT_ATTEMPTS_PATH, self)
    }

    /// Count one more launch
    pub fn record_attempt(&mut self) {
        self.pending_count = self.pending_count.saturating_add(1);
    }

    /// Forget all pending launches
    pub fn reset(&mut self) {
        self.pending_count = 0;
    }

    /// Check whether the rollback threshold has been reached
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.pending_count >= self.threshold
    }
}

/// Confirm that the running application booted healthily
///
/// Called by the application once it is up. Resets the pending launch
/// count; does nothing if it is already zero.
///
/// # Errors
///
/// Storage failures. A corrupt counter is overwritten.
pub fn mark_boot_success<S: Storage + ?Sized>(storage: &mut S) -> Result<(), Error> {
    let mut state = match load_json::<BootAttemptState, S>(storage, BOOT_ATTEMPTS_PATH) {
        Ok(Some(state)) => state,
        Ok(None) => return Ok(()),
        Err(Error::StorageCorrupted) => BootAttemptState::default(),
        Err(e) => return Err(e),
    };
    if state.pending_count == 0 {
        return Ok(());
    }
    state.reset();
    state.save(storage)
}
