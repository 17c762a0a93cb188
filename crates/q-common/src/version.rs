// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Application release versions
//!
//! Releases are identified by a `MAJOR.MINOR.PATCH` string. Ordering is the
//! numeric tuple order; the updater only ever installs a release that is
//! strictly greater than the installed one.

use alloc::string::String;
use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::Error;

/// Semantic release version
///
/// Only the numeric core is supported: pre-release and build suffixes are
/// rejected rather than guessed at.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Version {
    /// Major version (breaking changes)
    pub major: u32,
    /// Minor version (new features)
    pub minor: u32,
    /// Patch version (bug fixes)
    pub patch: u32,
}

impl Version {
    /// Create a new version
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Version reported when nothing has ever been installed
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Parse `MAJOR.MINOR.PATCH`, ignoring surrounding whitespace
    ///
    /// # Errors
    ///
    /// `Error::ManifestInvalidVersion` if the string does not have exactly
    /// three dot-separated decimal components.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut parts = text.trim().split('.');
        let mut next = || -> Result<u32, Error> {
            let part = parts.next().ok_or(Error::ManifestInvalidVersion)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::ManifestInvalidVersion);
            }
            part.parse().map_err(|_| Error::ManifestInvalidVersion)
        };

        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(Error::ManifestInvalidVersion);
        }
        Ok(version)
    }

    /// Check if this version is strictly greater than another
    #[must_use]
    pub const fn is_greater_than(&self, other: &Self) -> bool {
        if self.major != other.major {
            return self.major > other.major;
        }
        if self.minor != other.minor {
            return self.minor > other.minor;
        }
        self.patch > other.patch
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({}.{}.{})", self.major, self.minor, self.patch)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(|_| de::Error::custom("expected MAJOR.MINOR.PATCH"))
    }
}
