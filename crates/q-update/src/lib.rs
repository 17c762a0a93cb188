// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Q-Update: staged application updates for Qbitel devices
//!
//! Provides the update core used by the boot sequencer:
//!
//! - **Manifest handling**: fetch and validate the release manifest
//! - **Staged download**: stream payload files into a disposable slot
//! - **Integrity verification**: per-file SHA-256, constant-time compare
//! - **Slot management**: current / staging / previous directories with seals
//! - **Atomic swap**: rename-ordered promotion, rollback and boot-time repair
//! - **Persisted state**: installed version record and boot attempt counter
//!
//! Platform access goes through two capabilities, [`storage::Storage`] and
//! [`transport::HttpClient`], so the core runs unchanged on a device and
//! on a host.
//!
//! # Features
//!
//! - `std`: host filesystem storage backend ([`storage::FsStorage`])

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod apply;
pub mod client;
pub mod manifest;
pub mod slots;
pub mod staged;
pub mod state;
pub mod storage;
pub mod transport;
pub mod verification;

pub use apply::{PromoteOutcome, RecoveryReport, RollbackOutcome, SlotRepair, SwapManager};
pub use client::ManifestClient;
pub use manifest::{FileEntry, Manifest};
pub use slots::{FileSet, SlotName, SlotState, SlotStatus};
pub use staged::{PayloadStager, SealedSet, StagedSet};
pub use state::{mark_boot_success, BootAttemptState, InstalledVersionRecord};
pub use storage::{atomic_write, MemStorage, Storage};
pub use transport::{ChunkSink, HttpClient};
pub use verification::{Digest, IntegrityVerifier};

#[cfg(feature = "std")]
pub use storage::FsStorage;
