// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Payload integrity verification
//!
//! SHA-256 over payload bytes, computed incrementally so that no file is
//! ever held in memory in full. Digest comparison is constant-time.

use alloc::string::String;
use core::fmt;
use core::str::FromStr;

use q_common::constants::SHA256_DIGEST_SIZE;
use q_common::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use subtle::ConstantTimeEq;

use crate::storage::Storage;

/// SHA-256 digest
///
/// Parsed from and rendered as 64 hex characters. Parsing accepts either
/// case; rendering is lowercase.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; SHA256_DIGEST_SIZE]);

impl Digest {
    /// Wrap raw digest bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SHA256_DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SHA256_DIGEST_SIZE] {
        &self.0
    }

    /// Parse 64 hex characters
    ///
    /// # Errors
    ///
    /// `Error::ManifestInvalidHash` for any other input.
    pub fn from_hex(text: &str) -> Result<Self, Error> {
        let mut bytes = [0u8; SHA256_DIGEST_SIZE];
        hex::decode_to_slice(text.trim(), &mut bytes).map_err(|_| Error::ManifestInvalidHash)?;
        Ok(Self(bytes))
    }

    /// Digest of an in-memory buffer
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        let mut verifier = IntegrityVerifier::new();
        verifier.update(data);
        verifier.finalize()
    }

    /// Constant-time equality
    #[must_use]
    pub fn ct_eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// Incremental SHA-256 verifier
#[derive(Clone, Default)]
pub struct IntegrityVerifier {
    hasher: Sha256,
    length: u64,
}

impl IntegrityVerifier {
    /// Start a new digest
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.length += chunk.len() as u64;
    }

    /// Bytes consumed so far
    #[must_use]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Finish and return the digest
    #[must_use]
    pub fn finalize(self) -> Digest {
        Digest::from_bytes(self.hasher.finalize().into())
    }

    /// Finish and compare against `expected`
    #[must_use]
    pub fn matches(self, expected: &Digest) -> bool {
        self.finalize().ct_eq(expected)
    }
}

/// Check a chunk sequence against an expected digest
///
/// Chunk boundaries do not affect the result.
pub fn verify<'a, I>(chunks: I, expected: &Digest) -> bool
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut verifier = IntegrityVerifier::new();
    for chunk in chunks {
        verifier.update(chunk);
    }
    verifier.matches(expected)
}

/// Stream a stored blob through SHA-256, `chunk_size` bytes at a time
///
/// Returns the digest and the number of bytes hashed.
///
/// # Errors
///
/// Storage errors from reading the blob.
pub fn digest_blob<S: Storage + ?Sized>(
    storage: &S,
    path: &str,
    chunk_size: usize,
) -> Result<(Digest, u64), Error> {
    let mut buf = alloc::vec![0u8; chunk_size.max(1)];
    let mut verifier = IntegrityVerifier::new();
    loop {
        let n = storage.read_at(path, verifier.length(), &mut buf)?;
        if n == 0 {
            break;
        }
        verifier.update(&buf[..n]);
    }
    let length = verifier.length();
    Ok((verifier.finalize(), length))
}

/// Check a stored blob against an expected digest
///
/// # Errors
///
/// Storage errors from reading the blob. A digest mismatch is `Ok(false)`.
pub fn verify_blob<S: Storage + ?Sized>(
    storage: &S,
    path: &str,
    expected: &Digest,
    chunk_size: usize,
) -> Result<bool, Error> {
    let (actual, _) = digest_blob(storage, path, chunk_size)?;
    Ok(actual.ct_eq(expected))
}
