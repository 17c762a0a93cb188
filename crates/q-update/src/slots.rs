// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Application slots
//!
//! The application lives in one of three directories:
//!
//! ```text
//! ┌──────────────┬──────────────┬────────────────────────────────────────┐
//! │ Slot         │ Directory    │ Contents                               │
//! ├──────────────┼──────────────┼────────────────────────────────────────┤
//! │ current      │ /app         │ Application that is launched           │
//! │ staging      │ /next        │ Release being downloaded (disposable)  │
//! │ previous     │ /app_prev    │ Last application that ran before       │
//! └──────────────┴──────────────┴────────────────────────────────────────┘
//! ```
//!
//! A fourth directory, `/app_swap`, only exists while a rollback is moving
//! `current` and `previous` past each other.
//!
//! # Seals
//!
//! A slot whose contents have been verified carries a seal, `.slot.json`,
//! recording the release version and the digest of every file. The seal is
//! the slot's [`FileSet`]. It is written last, so a sealed staging slot is
//! always complete and a slot without a seal proves nothing.

use alloc::string::String;
use alloc::vec::Vec;

use q_common::constants::{CURRENT_DIR, PREVIOUS_DIR, SLOT_SEAL_NAME, STAGING_DIR};
use q_common::{Error, Version};
use serde::{Deserialize, Serialize};

use crate::manifest::Manifest;
use crate::storage::{atomic_write, join, Storage};
use crate::verification::{digest_blob, Digest};

// ============================================================================
// Slot Identification
// ============================================================================

/// Slot identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotName {
    /// Application that is launched
    Current,
    /// Release being downloaded
    Staging,
    /// Last application that ran before `current`
    Previous,
}

impl SlotName {
    /// All slots, in display order
    pub const ALL: [Self; 3] = [Self::Current, Self::Staging, Self::Previous];

    /// Directory backing this slot
    #[must_use]
    pub const fn dir(&self) -> &'static str {
        match self {
            Self::Current => CURRENT_DIR,
            Self::Staging => STAGING_DIR,
            Self::Previous => PREVIOUS_DIR,
        }
    }

    /// Short name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Staging => "staging",
            Self::Previous => "previous",
        }
    }
}

// ============================================================================
// File Sets
// ============================================================================

/// One file recorded in a seal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotFile {
    /// Path relative to the slot root
    pub path: String,
    /// Digest of the contents
    pub sha256: Digest,
    /// Length in bytes
    pub size: u64,
}

/// Verified contents of a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSet {
    /// Release version
    pub version: Version,
    /// Files, in manifest order
    pub files: Vec<SlotFile>,
}

impl FileSet {
    /// File set a manifest describes
    #[must_use]
    pub fn from_manifest(manifest: &Manifest) -> Self {
        Self {
            version: manifest.version(),
            files: manifest
                .files()
                .iter()
                .map(|f| SlotFile {
                    path: f.path.clone(),
                    sha256: f.sha256,
                    size: f.size,
                })
                .collect(),
        }
    }

    /// Check whether the set records `path`
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
    }
}

/// Seal location for a slot directory
#[must_use]
pub fn seal_path(dir: &str) -> String {
    join(dir, SLOT_SEAL_NAME)
}

/// Read the seal of the slot at `dir`
///
/// `Ok(None)` when the slot has no seal.
///
/// # Errors
///
/// `Error::StorageCorrupted` when a seal exists but cannot be parsed.
pub fn read_seal<S: Storage + ?Sized>(storage: &S, dir: &str) -> Result<Option<FileSet>, Error> {
    let path = seal_path(dir);
    if !storage.exists(&path) {
        return Ok(None);
    }
    let data = storage.read(&path)?;
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|_| Error::StorageCorrupted)
}

/// Seal the slot at `dir`
///
/// # Errors
///
/// Storage errors from the write.
pub fn write_seal<S: Storage + ?Sized>(storage: &mut S, dir: &str, set: &FileSet) -> Result<(), Error> {
    let data = serde_json::to_vec(set).map_err(|_| Error::InternalError)?;
    atomic_write(storage, &seal_path(dir), &data)
}

// ============================================================================
// Slot Queries
// ============================================================================

/// Verified contents of `slot`
///
/// `Ok(None)` when the slot is empty or unsealed.
///
/// # Errors
///
/// `Error::StorageCorrupted` for an unreadable seal.
pub fn get<S: Storage + ?Sized>(storage: &S, slot: SlotName) -> Result<Option<FileSet>, Error> {
    read_seal(storage, slot.dir())
}

/// Check whether `slot` holds anything at all
#[must_use]
pub fn is_present<S: Storage + ?Sized>(storage: &S, slot: SlotName) -> bool {
    storage.exists(slot.dir())
}

/// Delete everything in `slot`
///
/// # Errors
///
/// `Error::StorageDeleteFailed`.
pub fn clear<S: Storage + ?Sized>(storage: &mut S, slot: SlotName) -> Result<(), Error> {
    storage.remove(slot.dir())
}

/// Re-hash a sealed slot and compare against its seal
///
/// Returns the file set on success.
///
/// # Errors
///
/// - `StorageNotFound` when the slot is unsealed or a recorded file is missing
/// - `SizeMismatch` or `HashMismatch` when contents differ from the seal
pub fn verify_contents<S: Storage + ?Sized>(
    storage: &S,
    slot: SlotName,
    chunk_size: usize,
) -> Result<FileSet, Error> {
    let set = get(storage, slot)?.ok_or(Error::StorageNotFound)?;
    for file in &set.files {
        let (digest, length) = digest_blob(storage, &join(slot.dir(), &file.path), chunk_size)?;
        if length != file.size {
            return Err(Error::SizeMismatch);
        }
        if !digest.ct_eq(&file.sha256) {
            return Err(Error::HashMismatch);
        }
    }
    Ok(set)
}

// ============================================================================
// Diagnostics
// ============================================================================

/// State of a single slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing stored
    Empty,
    /// Files present without a seal
    Unsealed,
    /// Verified release
    Sealed(Version),
    /// Seal present but unreadable
    Corrupted,
}

impl SlotState {
    /// Check if the slot can be launched or restored
    #[must_use]
    pub fn is_bootable(&self) -> bool {
        matches!(self, Self::Unsealed | Self::Sealed(_))
    }
}

/// Slot status for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotStatus {
    /// `current` slot
    pub current: SlotState,
    /// `staging` slot
    pub staging: SlotState,
    /// `previous` slot
    pub previous: SlotState,
}

/// State of one slot
#[must_use]
pub fn state<S: Storage + ?Sized>(storage: &S, slot: SlotName) -> SlotState {
    if !is_present(storage, slot) {
        return SlotState::Empty;
    }
    match get(storage, slot) {
        Ok(Some(set)) => SlotState::Sealed(set.version),
        Ok(None) => SlotState::Unsealed,
        Err(_) => SlotState::Corrupted,
    }
}

/// State of every slot
#[must_use]
pub fn status<S: Storage + ?Sized>(storage: &S) -> SlotStatus {
    SlotStatus {
        current: state(storage, SlotName::Current),
        staging: state(storage, SlotName::Staging),
        previous: state(storage, SlotName::Previous),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;
    use alloc::vec;

    fn sealed_current(storage: &mut MemStorage, body: &[u8]) -> FileSet {
        storage.write("/app/app_main.py", body).unwrap();
        let set = FileSet {
            version: Version::new(1, 0, 0),
            files: vec![SlotFile {
                path: "app_main.py".into(),
                sha256: Digest::of(body),
                size: body.len() as u64,
            }],
        };
        write_seal(storage, CURRENT_DIR, &set).unwrap();
        set
    }

    #[test]
    fn test_slot_dirs_distinct() {
        assert_ne!(SlotName::Current.dir(), SlotName::Staging.dir());
        assert_ne!(SlotName::Current.dir(), SlotName::Previous.dir());
        assert_eq!(SlotName::Previous.as_str(), "previous");
    }

    #[test]
    fn test_seal_round_trip() {
        let mut storage = MemStorage::new();
        let set = sealed_current(&mut storage, b"print(1)");
        assert_eq!(get(&storage, SlotName::Current).unwrap(), Some(set));
        assert_eq!(get(&storage, SlotName::Previous).unwrap(), None);
    }

    #[test]
    fn test_status_states() {
        let mut storage = MemStorage::new();
        sealed_current(&mut storage, b"print(1)");
        storage.write("/next/app_main.py", b"partial").unwrap();
        storage.write("/app_prev/.slot.json", b"{garbage").unwrap();

        let status = status(&storage);
        assert_eq!(status.current, SlotState::Sealed(Version::new(1, 0, 0)));
        assert_eq!(status.staging, SlotState::Unsealed);
        assert_eq!(status.previous, SlotState::Corrupted);
        assert!(!status.previous.is_bootable());
    }

    #[test]
    fn test_verify_contents_detects_tamper() {
        let mut storage = MemStorage::new();
        sealed_current(&mut storage, b"print(1)");
        assert!(verify_contents(&storage, SlotName::Current, 4).is_ok());

        storage.write("/app/app_main.py", b"print(2)").unwrap();
        assert_eq!(
            verify_contents(&storage, SlotName::Current, 4),
            Err(Error::HashMismatch)
        );
    }

    #[test]
    fn test_clear() {
        let mut storage = MemStorage::new();
        sealed_current(&mut storage, b"x");
        clear(&mut storage, SlotName::Current).unwrap();
        assert_eq!(state(&storage, SlotName::Current), SlotState::Empty);
    }
}
