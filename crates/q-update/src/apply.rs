// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Slot swapping
//!
//! Promotion and rollback are sequences of directory renames. Each rename is
//! atomic, and the sequences are ordered so that every intermediate state
//! is one that [`SwapManager::recover`] can finish or undo at the next boot.
//!
//! # Promotion
//!
//! ```text
//! 1. remove   previous
//! 2. rename   current  → previous
//! 3. rename   staging  → current      ← commit point
//! 4. write    installed version record
//! 5. write    boot attempt counter (0)
//! ```
//!
//! # Rollback
//!
//! ```text
//! 1. rename   current  → swap
//! 2. rename   previous → current      ← commit point
//! 3. rename   swap     → previous
//! 4. write    installed version record (rejected = rolled-back version)
//! 5. write    boot attempt counter (0)
//! ```
//!
//! Failures before the commit point are returned as errors with `current`
//! unchanged. Failures after it are reported alongside the outcome; the
//! slot change itself has happened and recovery repairs the records.

use q_common::constants::{CURRENT_DIR, PREVIOUS_DIR, STAGING_DIR, SWAP_DIR};
use q_common::{Error, Version};

use crate::slots::{self, SlotName};
use crate::staged::SealedSet;
use crate::state::{BootAttemptState, InstalledVersionRecord};
use crate::storage::Storage;

/// Result of a committed promotion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromoteOutcome {
    /// Release now in `current`
    pub version: Version,
    /// Record update that failed after the commit point
    pub bookkeeping_error: Option<Error>,
}

/// Result of a committed rollback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackOutcome {
    /// Release restored into `current`
    pub restored: Version,
    /// Release moved out of `current`, now quarantined
    pub rejected: Version,
    /// Step that failed after the commit point
    pub bookkeeping_error: Option<Error>,
}

/// Repair performed on the slot layout at boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRepair {
    /// Layout was consistent
    None,
    /// An interrupted rollback was completed
    FinishedRollback,
    /// `current` was missing and a sealed staging slot took its place
    RolledForward,
    /// `current` was missing and `previous` took its place
    RestoredPrevious,
}

/// Result of a boot-time consistency pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Slot layout repair
    pub slots: SlotRepair,
    /// Installed version record rewritten to match `current`
    pub record_repaired: bool,
    /// Leftover staging contents removed
    pub staging_discarded: bool,
}

impl RecoveryReport {
    /// Check whether anything was changed
    #[must_use]
    pub fn changed(&self) -> bool {
        self.slots != SlotRepair::None || self.record_repaired || self.staging_discarded
    }
}

/// Moves releases between slots
pub struct SwapManager<'a, S: Storage> {
    storage: &'a mut S,
    threshold: u32,
}

impl<'a, S: Storage> SwapManager<'a, S> {
    /// Create a swap manager; `threshold` is written into reset counters
    pub fn new(storage: &'a mut S, threshold: u32) -> Self {
        Self { storage, threshold }
    }

    /// Make the sealed staging release the current one
    ///
    /// # Errors
    ///
    /// Storage errors before the commit point. `current` still holds the
    /// release it held before the call.
    pub fn promote(&mut self, sealed: SealedSet) -> Result<PromoteOutcome, Error> {
        let version = sealed.version();

        self.storage.remove(PREVIOUS_DIR)?;
        let had_current = self.storage.exists(CURRENT_DIR);
        if had_current {
            self.storage.rename(CURRENT_DIR, PREVIOUS_DIR)?;
        }
        if let Err(e) = self.storage.rename(STAGING_DIR, CURRENT_DIR) {
            // Put the old release back; the caller repairs the slots if this fails too.
            if had_current {
                let _ = self.storage.rename(PREVIOUS_DIR, CURRENT_DIR);
            }
            return Err(e);
        }

        let mut record = self.load_record();
        record.promoted(version);
        let bookkeeping_error = record
            .save(&mut *self.storage)
            .and_then(|()| self.reset_attempts())
            .err();

        Ok(PromoteOutcome {
            version,
            bookkeeping_error,
        })
    }

    /// Restore the previous release into `current`
    ///
    /// The release moved out of `current` is recorded as rejected so that
    /// it is not installed again.
    ///
    /// # Errors
    ///
    /// - `RollbackExhausted` when `previous` is empty
    /// - storage errors before the commit point, with `current` unchanged
    pub fn rollback(&mut self) -> Result<RollbackOutcome, Error> {
        if !slots::is_present(&*self.storage, SlotName::Previous) {
            return Err(Error::RollbackExhausted);
        }

        let record = self.load_record();
        let rejected = match slots::get(&*self.storage, SlotName::Current) {
            Ok(Some(set)) => set.version,
            _ => record.version,
        };
        // An unsealed previous slot predates version tracking.
        let restored = match slots::get(&*self.storage, SlotName::Previous) {
            Ok(Some(set)) => set.version,
            _ => Version::ZERO,
        };

        self.storage.remove(SWAP_DIR)?;
        let had_current = self.storage.exists(CURRENT_DIR);
        if had_current {
            self.storage.rename(CURRENT_DIR, SWAP_DIR)?;
        }
        if let Err(e) = self.storage.rename(PREVIOUS_DIR, CURRENT_DIR) {
            if had_current {
                let _ = self.storage.rename(SWAP_DIR, CURRENT_DIR);
            }
            return Err(e);
        }

        let mut bookkeeping_error = None;
        if had_current {
            bookkeeping_error = self.storage.rename(SWAP_DIR, PREVIOUS_DIR).err();
        }

        let updated = InstalledVersionRecord {
            version: restored,
            rejected: Some(rejected),
        };
        let records = updated.save(&mut *self.storage).and_then(|()| self.reset_attempts());
        bookkeeping_error = bookkeeping_error.or(records.err());

        Ok(RollbackOutcome {
            restored,
            rejected,
            bookkeeping_error,
        })
    }

    /// Bring the slot layout and records to a consistent state
    ///
    /// Run once per boot before anything reads the slots. Finishes an
    /// interrupted rollback, replaces a missing `current`, discards stray
    /// staging contents and realigns the installed version record with
    /// the seal in `current`. Does nothing on a consistent layout.
    ///
    /// # Errors
    ///
    /// - `NoBootableApp` when no slot can supply a `current` release
    /// - storage errors from the repair steps
    pub fn recover(&mut self) -> Result<RecoveryReport, Error> {
        let mut report = RecoveryReport {
            slots: SlotRepair::None,
            record_repaired: false,
            staging_discarded: false,
        };

        if self.storage.exists(SWAP_DIR) {
            if !self.storage.exists(CURRENT_DIR) {
                let source = if self.storage.exists(PREVIOUS_DIR) {
                    PREVIOUS_DIR
                } else {
                    SWAP_DIR
                };
                self.storage.rename(source, CURRENT_DIR)?;
            }
            if self.storage.exists(SWAP_DIR) {
                if self.storage.exists(PREVIOUS_DIR) {
                    self.storage.remove(SWAP_DIR)?;
                } else {
                    self.storage.rename(SWAP_DIR, PREVIOUS_DIR)?;
                }
            }
            report.slots = SlotRepair::FinishedRollback;
        } else if !self.storage.exists(CURRENT_DIR) {
            if matches!(slots::get(&*self.storage, SlotName::Staging), Ok(Some(_))) {
                self.storage.rename(STAGING_DIR, CURRENT_DIR)?;
                report.slots = SlotRepair::RolledForward;
            } else if self.storage.exists(PREVIOUS_DIR) {
                self.storage.rename(PREVIOUS_DIR, CURRENT_DIR)?;
                report.slots = SlotRepair::RestoredPrevious;
            } else {
                return Err(Error::NoBootableApp);
            }
        }

        if self.storage.exists(STAGING_DIR) {
            self.storage.remove(STAGING_DIR)?;
            report.staging_discarded = true;
        }

        report.record_repaired = self.realign_record()?;
        Ok(report)
    }

    fn realign_record(&mut self) -> Result<bool, Error> {
        let Ok(Some(current)) = slots::get(&*self.storage, SlotName::Current) else {
            return Ok(false);
        };
        let loaded = InstalledVersionRecord::load(&*self.storage);
        if matches!(loaded, Ok(r) if r.version == current.version) {
            return Ok(false);
        }

        let mut record = loaded.unwrap_or_default();
        if record.version.is_greater_than(&current.version) {
            // Rolled back from the recorded release.
            record.rejected = Some(record.version);
        } else if record.rejected.is_some_and(|r| r <= current.version) {
            record.rejected = None;
        }
        record.version = current.version;
        record.save(&mut *self.storage)?;
        self.reset_attempts()?;
        Ok(true)
    }

    fn load_record(&self) -> InstalledVersionRecord {
        InstalledVersionRecord::load(&*self.storage).unwrap_or_default()
    }

    fn reset_attempts(&mut self) -> Result<(), Error> {
        BootAttemptState::new(self.threshold).save(&mut *self.storage)
    }
}
