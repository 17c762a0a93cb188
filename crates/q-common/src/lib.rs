// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Qbitel OTA Common Library
//!
//! Shared pieces of the boot-time application updater: the error taxonomy,
//! the diagnostic log buffer, device and boot configuration, the release
//! version type and the storage layout constants.
//!
//! # Features
//!
//! - `std`: Enable standard library support (disabled by default for embedded)
//! - `defmt`: Enable defmt formatting of errors for embedded debugging
//! - `log`: Forward diagnostic log entries to the `log` facade
//!
//! # Security
//!
//! Wi-Fi credentials are zeroized on drop and redacted from `Debug` output.

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod errors;
pub mod config;
pub mod log;
pub mod constants;
pub mod version;

// Re-export commonly used items
pub use errors::{Error, ErrorKind, Result};
pub use config::{BootConfig, DeviceConfig};
pub use version::Version;
