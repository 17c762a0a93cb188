// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Persistent Boot Failure Logging
//!
//! Keeps the most recent boot failures in `/boot_log.json` so they survive
//! resets and can be read back over a diagnostic session. Entries record
//! the boot stage, the error category and code, and the installed version
//! at the time.
//!
//! # Entry Format
//!
//! ```json
//! {"seq":7,"stage":8,"category":3,"error_code":769,"version":"0.1.2"}
//! ```
//!
//! Stage and category are stored as their numeric codes. The file is
//! replaced through the atomic-write discipline, so a reset while logging
//! leaves the previous log intact.

use alloc::collections::VecDeque;

use q_common::constants::BOOT_LOG_PATH;
use q_common::{Error, ErrorKind, Version};
use q_update::storage::{atomic_write, Storage};
use serde::{Deserialize, Serialize};

/// Maximum number of log entries kept
pub const MAX_LOG_ENTRIES: usize = 16;

// ============================================================================
// Boot Stage
// ============================================================================

/// Boot stage where a failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
#[repr(u8)]
pub enum BootStage {
    /// Slot consistency pass
    SlotRecovery = 0,
    /// Crash-counting rollback
    Rollback = 1,
    /// Network association
    Connect = 2,
    /// Manifest retrieval
    FetchManifest = 3,
    /// Version comparison
    Compare = 4,
    /// Payload download
    Stage = 5,
    /// Staging re-verification
    VerifyAll = 6,
    /// Slot promotion
    Promote = 7,
    /// Application launch
    RunCurrent = 8,
    /// Unknown stage
    Unknown = 255,
}

impl From<u8> for BootStage {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::SlotRecovery,
            1 => Self::Rollback,
            2 => Self::Connect,
            3 => Self::FetchManifest,
            4 => Self::Compare,
            5 => Self::Stage,
            6 => Self::VerifyAll,
            7 => Self::Promote,
            8 => Self::RunCurrent,
            _ => Self::Unknown,
        }
    }
}

impl From<BootStage> for u8 {
    fn from(stage: BootStage) -> Self {
        stage as u8
    }
}

// ============================================================================
// Error Category
// ============================================================================

/// Boot error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
#[repr(u8)]
pub enum ErrorCategory {
    /// No error (informational entry)
    None = 0,
    /// Transport or timeout failure
    Network = 1,
    /// Malformed manifest
    ManifestParse = 2,
    /// Downloaded content failed its integrity check
    HashMismatch = 3,
    /// Storage read, write or rename failure
    Filesystem = 4,
    /// Rollback performed after repeated unconfirmed boots
    Rollback = 5,
    /// Rollback needed but no previous application exists
    RollbackExhausted = 6,
    /// Device configuration missing or invalid
    Config = 7,
    /// Unknown error
    Unknown = 255,
}

impl From<u8> for ErrorCategory {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::None,
            1 => Self::Network,
            2 => Self::ManifestParse,
            3 => Self::HashMismatch,
            4 => Self::Filesystem,
            5 => Self::Rollback,
            6 => Self::RollbackExhausted,
            7 => Self::Config,
            _ => Self::Unknown,
        }
    }
}

impl From<ErrorCategory> for u8 {
    fn from(category: ErrorCategory) -> Self {
        category as u8
    }
}

impl From<ErrorKind> for ErrorCategory {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Network => Self::Network,
            ErrorKind::ManifestParse => Self::ManifestParse,
            ErrorKind::HashMismatch => Self::HashMismatch,
            ErrorKind::Filesystem => Self::Filesystem,
            ErrorKind::RollbackExhausted => Self::RollbackExhausted,
            ErrorKind::Config => Self::Config,
            ErrorKind::General => Self::Unknown,
        }
    }
}

// ============================================================================
// Boot Log Entry
// ============================================================================

/// A single boot log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootLogEntry {
    /// Sequence number (monotonic across the log's lifetime)
    pub seq: u32,
    /// Boot stage where the failure occurred
    pub stage: BootStage,
    /// Error category
    pub category: ErrorCategory,
    /// Specific error code (from `q_common::Error`, `0` if none)
    pub error_code: u16,
    /// Installed version at the time
    pub version: Version,
}

// ============================================================================
// Boot Log Manager
// ============================================================================

/// Boot log manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootLog {
    /// Total entries ever written
    total_entries: u32,
    /// Retained entries, oldest first
    entries: VecDeque<BootLogEntry>,
}

impl BootLog {
    /// Create an empty log
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total_entries: 0,
            entries: VecDeque::new(),
        }
    }

    /// Read the persisted log
    ///
    /// A missing or unreadable log yields an empty one; the boot path must
    /// never fail because of its diagnostics.
    pub fn load<S: Storage + ?Sized>(storage: &S) -> Self {
        storage
            .read(BOOT_LOG_PATH)
            .ok()
            .and_then(|data| serde_json::from_slice::<Self>(&data).ok())
            .map(|mut log| {
                while log.entries.len() > MAX_LOG_ENTRIES {
                    log.entries.pop_front();
                }
                log
            })
            .unwrap_or_default()
    }

    /// Log a boot failure caused by `error`
    ///
    /// # Errors
    ///
    /// Storage errors from persisting the log.
    pub fn log_failure<S: Storage + ?Sized>(
        &mut self,
        storage: &mut S,
        stage: BootStage,
        error: Error,
        version: Version,
    ) -> Result<(), Error> {
        self.log_event(storage, stage, ErrorCategory::from(error.kind()), error.code(), version)
    }

    /// Log an event with an explicit category
    ///
    /// # Errors
    ///
    /// Storage errors from persisting the log.
    pub fn log_event<S: Storage + ?Sized>(
        &mut self,
        storage: &mut S,
        stage: BootStage,
        category: ErrorCategory,
        error_code: u16,
        version: Version,
    ) -> Result<(), Error> {
        self.total_entries = self.total_entries.wrapping_add(1);
        if self.entries.len() == MAX_LOG_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(BootLogEntry {
            seq: self.total_entries,
            stage,
            category,
            error_code,
            version,
        });
        self.save(storage)
    }

    /// Get the most recent log entry
    #[must_use]
    pub fn get_latest(&self) -> Option<&BootLogEntry> {
        self.entries.back()
    }

    /// Get log entry by index (0 = most recent)
    #[must_use]
    pub fn get_entry(&self, index: usize) -> Option<&BootLogEntry> {
        self.entries.iter().rev().nth(index)
    }

    /// Iterate entries, most recent first
    pub fn iter(&self) -> impl Iterator<Item = &BootLogEntry> {
        self.entries.iter().rev()
    }

    /// Get total number of failures logged
    #[must_use]
    pub fn total_failures(&self) -> u32 {
        self.total_entries
    }

    /// Get number of entries currently stored
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn save<S: Storage + ?Sized>(&self, storage: &mut S) -> Result<(), Error> {
        let data = serde_json::to_vec(self).map_err(|_| Error::InternalError)?;
        atomic_write(storage, BOOT_LOG_PATH, &data)
    }
}

// ============================================================================
// Tests
// ============================================================================
