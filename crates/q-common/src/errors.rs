// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Error types for the OTA boot updater
//!
//! This module defines the unified error type used by every stage of the
//! boot sequence. Errors are `Copy`, carry no heap data and map onto a small
//! set of [`ErrorKind`]s that drive the sequencer's fallback policy.

use core::fmt;

/// Result type alias for updater operations
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the OTA boot updater
///
/// Each variant belongs to exactly one [`ErrorKind`]; the numeric code
/// groups variants by kind for compact logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Network Errors (0x01xx)
    // =========================================================================
    /// Could not establish a connection (link down, DNS, TLS, refused)
    ConnectFailed,
    /// A blocking network operation exceeded its timeout
    NetworkTimeout,
    /// Server answered with a non-success HTTP status
    HttpStatus(u16),
    /// URL is not an absolute http(s) endpoint, or plain http is not allowed
    InvalidUrl,
    /// Response body exceeded the allowed size
    ResponseTooLarge,

    // =========================================================================
    // Manifest Errors (0x02xx)
    // =========================================================================
    /// Manifest document is not valid JSON or has the wrong shape
    ManifestMalformed,
    /// A required manifest field is absent
    ManifestMissingField,
    /// Manifest version is not a `MAJOR.MINOR.PATCH` string
    ManifestInvalidVersion,
    /// A file digest is not 64 hex characters
    ManifestInvalidHash,
    /// A file path is empty, escapes the slot, or collides with the seal
    ManifestInvalidPath,
    /// Manifest lists no files
    ManifestEmpty,
    /// Two manifest entries share a path
    ManifestDuplicatePath,

    // =========================================================================
    // Integrity Errors (0x03xx)
    // =========================================================================
    /// Downloaded content does not match the declared SHA-256
    HashMismatch,
    /// Downloaded content does not match the declared size
    SizeMismatch,

    // =========================================================================
    // Storage Errors (0x04xx)
    // =========================================================================
    /// Storage read operation failed
    StorageReadFailed,
    /// Storage write operation failed
    StorageWriteFailed,
    /// Storage rename operation failed
    StorageRenameFailed,
    /// Storage delete operation failed
    StorageDeleteFailed,
    /// Requested blob not found in storage
    StorageNotFound,
    /// Stored record could not be decoded
    StorageCorrupted,

    // =========================================================================
    // Update Errors (0x05xx)
    // =========================================================================
    /// Rollback requested but no previous application is available
    RollbackExhausted,
    /// No slot holds a bootable application
    NoBootableApp,

    // =========================================================================
    // Configuration Errors (0x06xx)
    // =========================================================================
    /// Device configuration file is absent
    ConfigMissing,
    /// Device configuration is malformed or lacks a required key
    ConfigInvalid,

    // =========================================================================
    // General Errors (0xFFxx)
    // =========================================================================
    /// Invalid parameter provided
    InvalidParameter,
    /// Invalid state for the operation
    InvalidState,
    /// Internal error (should not occur)
    InternalError,
}

/// Error taxonomy used by the boot sequencer's propagation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport or timeout failure
    Network,
    /// Malformed or incomplete manifest
    ManifestParse,
    /// Downloaded content failed its integrity check
    HashMismatch,
    /// Storage read/write/rename failure
    Filesystem,
    /// Rollback requested with no valid previous slot
    RollbackExhausted,
    /// Launcher configuration failure
    Config,
    /// Anything else
    General,
}

impl Error {
    /// Get the error code for this error
    ///
    /// Error codes are organized by category:
    /// - 0x01xx: Network errors
    /// - 0x02xx: Manifest errors
    /// - 0x03xx: Integrity errors
    /// - 0x04xx: Storage errors
    /// - 0x05xx: Update errors
    /// - 0x06xx: Configuration errors
    /// - 0xFFxx: General errors
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::ConnectFailed => 0x0101,
            Self::NetworkTimeout => 0x0102,
            Self::HttpStatus(_) => 0x0103,
            Self::InvalidUrl => 0x0104,
            Self::ResponseTooLarge => 0x0105,

            Self::ManifestMalformed => 0x0201,
            Self::ManifestMissingField => 0x0202,
            Self::ManifestInvalidVersion => 0x0203,
            Self::ManifestInvalidHash => 0x0204,
            Self::ManifestInvalidPath => 0x0205,
            Self::ManifestEmpty => 0x0206,
            Self::ManifestDuplicatePath => 0x0207,

            Self::HashMismatch => 0x0301,
            Self::SizeMismatch => 0x0302,

            Self::StorageReadFailed => 0x0401,
            Self::StorageWriteFailed => 0x0402,
            Self::StorageRenameFailed => 0x0403,
            Self::StorageDeleteFailed => 0x0404,
            Self::StorageNotFound => 0x0405,
            Self::StorageCorrupted => 0x0406,

            Self::RollbackExhausted => 0x0501,
            Self::NoBootableApp => 0x0502,

            Self::ConfigMissing => 0x0601,
            Self::ConfigInvalid => 0x0602,

            Self::InvalidParameter => 0xFF01,
            Self::InvalidState => 0xFF02,
            Self::InternalError => 0xFFFF,
        }
    }

    /// Classify this error for the fallback policy
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectFailed
            | Self::NetworkTimeout
            | Self::HttpStatus(_)
            | Self::InvalidUrl
            | Self::ResponseTooLarge => ErrorKind::Network,

            Self::ManifestMalformed
            | Self::ManifestMissingField
            | Self::ManifestInvalidVersion
            | Self::ManifestInvalidHash
            | Self::ManifestInvalidPath
            | Self::ManifestEmpty
            | Self::ManifestDuplicatePath => ErrorKind::ManifestParse,

            Self::HashMismatch | Self::SizeMismatch => ErrorKind::HashMismatch,

            Self::StorageReadFailed
            | Self::StorageWriteFailed
            | Self::StorageRenameFailed
            | Self::StorageDeleteFailed
            | Self::StorageNotFound
            | Self::StorageCorrupted
            | Self::NoBootableApp => ErrorKind::Filesystem,

            Self::RollbackExhausted => ErrorKind::RollbackExhausted,

            Self::ConfigMissing | Self::ConfigInvalid => ErrorKind::Config,

            Self::InvalidParameter | Self::InvalidState | Self::InternalError => {
                ErrorKind::General
            }
        }
    }

    /// Check if this error can only be resolved out of band
    #[must_use]
    pub const fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::RollbackExhausted | Self::NoBootableApp)
    }

    /// Get a short description of the error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::ConnectFailed => "connection failed",
            Self::NetworkTimeout => "network timeout",
            Self::HttpStatus(_) => "unexpected HTTP status",
            Self::InvalidUrl => "invalid URL",
            Self::ResponseTooLarge => "response too large",
            Self::ManifestMalformed => "malformed manifest",
            Self::ManifestMissingField => "manifest field missing",
            Self::ManifestInvalidVersion => "invalid manifest version",
            Self::ManifestInvalidHash => "invalid manifest digest",
            Self::ManifestInvalidPath => "invalid manifest path",
            Self::ManifestEmpty => "manifest has no files",
            Self::ManifestDuplicatePath => "duplicate manifest path",
            Self::HashMismatch => "SHA-256 mismatch",
            Self::SizeMismatch => "size mismatch",
            Self::StorageReadFailed => "storage read failed",
            Self::StorageWriteFailed => "storage write failed",
            Self::StorageRenameFailed => "storage rename failed",
            Self::StorageDeleteFailed => "storage delete failed",
            Self::StorageNotFound => "storage item not found",
            Self::StorageCorrupted => "storage corrupted",
            Self::RollbackExhausted => "rollback exhausted",
            Self::NoBootableApp => "no bootable application",
            Self::ConfigMissing => "configuration missing",
            Self::ConfigInvalid => "configuration invalid",
            Self::InvalidParameter => "invalid parameter",
            Self::InvalidState => "invalid state",
            Self::InternalError => "internal error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpStatus(status) => {
                write!(f, "[0x{:04X}] {} {}", self.code(), self.description(), status)
            }
            _ => write!(f, "[0x{:04X}] {}", self.code(), self.description()),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "[0x{:04X}] {}", self.code(), self.description());
    }
}
