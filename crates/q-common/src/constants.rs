// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Storage layout and limits
//!
//! Every path the updater touches is defined here. Paths are absolute
//! within the device filesystem and use `/` as separator.

// =============================================================================
// Slot Directories
// =============================================================================

/// Running application (`current`)
pub const CURRENT_DIR: &str = "/app";

/// In-progress download (`staging`)
pub const STAGING_DIR: &str = "/next";

/// Last known-good application (`previous`)
pub const PREVIOUS_DIR: &str = "/app_prev";

/// Holding area used while `current` and `previous` trade places
pub const SWAP_DIR: &str = "/app_swap";

/// Seal written into a slot once its contents are verified
pub const SLOT_SEAL_NAME: &str = ".slot.json";

// =============================================================================
// Persisted Records
// =============================================================================

/// Installed version record
pub const INSTALLED_RECORD_PATH: &str = "/installed.json";

/// Boot attempt counter
pub const BOOT_ATTEMPTS_PATH: &str = "/boot_attempts.json";

/// Persistent boot failure log
pub const BOOT_LOG_PATH: &str = "/boot_log.json";

/// Device configuration
pub const DEVICE_CONFIG_PATH: &str = "/secrets.json";

/// Suffix for the temporary half of an atomic write
pub const TEMP_SUFFIX: &str = ".tmp";

// =============================================================================
// Application
// =============================================================================

/// Entry point launched from `current`
pub const APP_ENTRY_NAME: &str = "app_main";

// =============================================================================
// Limits
// =============================================================================

/// SHA-256 digest size in bytes
pub const SHA256_DIGEST_SIZE: usize = 32;

/// Maximum number of files in one release
pub const MAX_MANIFEST_FILES: usize = 64;

/// Maximum length of a file path inside a slot
pub const MAX_FILE_PATH_LEN: usize = 128;
