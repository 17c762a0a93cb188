// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Staged download
//!
//! Payload files are streamed into the staging slot one chunk at a time,
//! hashed as they are written and verified against the manifest. Staging is
//! fail-fast: the first error discards the staging slot and is returned;
//! nothing outside staging is touched.
//!
//! ```text
//!   stage()            verify_all()          SwapManager::promote()
//! ──────────► StagedSet ───────────► SealedSet ─────────────────────►
//!   download           re-hash + seal        swap into current
//! ```
//!
//! The typestate makes it impossible to promote a set that has not been
//! re-verified from storage and sealed.

use core::time::Duration;

use q_common::constants::STAGING_DIR;
use q_common::{BootConfig, Error, Version};

use crate::manifest::{FileEntry, Manifest};
use crate::slots::{self, FileSet, SlotName};
use crate::storage::{join, Storage};
use crate::transport::{check_url, HttpClient};
use crate::verification::{digest_blob, IntegrityVerifier};

/// Release fully downloaded into staging, not yet sealed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSet {
    set: FileSet,
}

impl StagedSet {
    /// Staged release version
    #[must_use]
    pub fn version(&self) -> Version {
        self.set.version
    }
}

/// Staged release re-verified from storage and sealed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSet {
    set: FileSet,
}

impl SealedSet {
    /// Sealed release version
    #[must_use]
    pub fn version(&self) -> Version {
        self.set.version
    }
}

/// Downloads a release into the staging slot
pub struct PayloadStager<'a, S: Storage, H: HttpClient> {
    storage: &'a mut S,
    http: &'a mut H,
    timeout: Duration,
    chunk_size: usize,
    allow_insecure: bool,
}

impl<'a, S: Storage, H: HttpClient> PayloadStager<'a, S, H> {
    /// Create a stager using the limits in `config`
    pub fn new(storage: &'a mut S, http: &'a mut H, config: &BootConfig) -> Self {
        Self {
            storage,
            http,
            timeout: Duration::from_millis(u64::from(config.http_timeout_ms)),
            chunk_size: config.chunk_size,
            allow_insecure: config.allow_insecure_http,
        }
    }

    /// Download every file of `manifest` into staging, in manifest order
    ///
    /// Every payload URL is checked against the scheme policy before
    /// anything is fetched. Any previous staging contents are discarded
    /// first.
    ///
    /// # Errors
    ///
    /// - `InvalidUrl` for a plain-http payload without `allow_insecure_http`,
    ///   with storage untouched
    /// - the first transport, storage, `SizeMismatch` or `HashMismatch`
    ///   error. Staging is cleared before returning it.
    pub fn stage(&mut self, manifest: &Manifest) -> Result<StagedSet, Error> {
        for entry in manifest.files() {
            check_url(&entry.url, self.allow_insecure)?;
        }
        slots::clear(&mut *self.storage, SlotName::Staging)?;

        for entry in manifest.files() {
            if let Err(e) = self.fetch_file(entry) {
                self.discard();
                return Err(e);
            }
        }

        Ok(StagedSet {
            set: FileSet::from_manifest(manifest),
        })
    }

    /// Re-hash every staged file from storage, then seal staging
    ///
    /// # Errors
    ///
    /// `SizeMismatch`, `HashMismatch` or a storage error. Staging is
    /// cleared before returning it.
    pub fn verify_all(&mut self, staged: StagedSet) -> Result<SealedSet, Error> {
        match self.check_and_seal(&staged.set) {
            Ok(()) => Ok(SealedSet { set: staged.set }),
            Err(e) => {
                self.discard();
                Err(e)
            }
        }
    }

    fn fetch_file(&mut self, entry: &FileEntry) -> Result<(), Error> {
        let dest = join(STAGING_DIR, &entry.path);
        let storage = &mut *self.storage;
        storage.write(&dest, &[])?;

        let declared = entry.size;
        let mut verifier = IntegrityVerifier::new();
        let mut sink = |chunk: &[u8]| {
            if verifier.length() + chunk.len() as u64 > declared {
                return Err(Error::SizeMismatch);
            }
            storage.append(&dest, chunk)?;
            verifier.update(chunk);
            Ok(())
        };
        self.http.get(&entry.url, self.timeout, &mut sink)?;

        if verifier.length() != declared {
            return Err(Error::SizeMismatch);
        }
        if !verifier.matches(&entry.sha256) {
            return Err(Error::HashMismatch);
        }
        Ok(())
    }

    fn check_and_seal(&mut self, set: &FileSet) -> Result<(), Error> {
        for file in &set.files {
            let path = join(STAGING_DIR, &file.path);
            let (digest, length) = digest_blob(&*self.storage, &path, self.chunk_size)?;
            if length != file.size {
                return Err(Error::SizeMismatch);
            }
            if !digest.ct_eq(&file.sha256) {
                return Err(Error::HashMismatch);
            }
        }
        slots::write_seal(&mut *self.storage, STAGING_DIR, set)
    }

    // Best effort; the next stage() clears staging again.
    fn discard(&mut self) {
        let _ = slots::clear(&mut *self.storage, SlotName::Staging);
    }
}
