// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Qbitel Boot Updater Library
//!
//! This crate decides, once per reset, what the device runs:
//!
//! - **Sequencer**: the boot state machine (update check, install, launch)
//! - **Recovery**: manual recovery-mode entry during the grace window
//! - **Platform**: board capabilities (delay, network link, indicator)
//! - **Boot Log**: persistent boot failure logging
//!
//! The update mechanics (manifests, staging, slots, rollback) live in
//! `q-update`; this crate only sequences them.
//!
//! # Features
//!
//! - `std`: host filesystem storage through `q-update`
//! - `host`: the `q-boot` launcher binary

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod boot_log;
pub mod platform;
pub mod recovery;
pub mod sequencer;

pub use boot_log::{BootLog, BootLogEntry, BootStage, ErrorCategory};
pub use platform::{Board, Delay, NetworkLink, NoIndicator, StatusIndicator, StatusPattern};
pub use recovery::{should_enter_recovery, RecoveryInput, RecoveryReason};
pub use sequencer::{BootOutcome, BootSequencer, BootState};
