// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Storage capability
//!
//! The updater never touches a filesystem directly. Everything goes through
//! [`Storage`], a small named-blob interface modelled on what a flash
//! filesystem (littlefs, FAT) offers: whole-blob writes, appends, offset
//! reads, delete and an atomic rename that works on single blobs and on
//! directory trees alike.
//!
//! # Crash Model
//!
//! Each mutating call is assumed to be atomic with respect to power loss:
//! after a reset the call has either happened completely or not at all.
//! Multi-step updates are made crash-safe by ordering renames (see
//! [`crate::apply`]) and by [`atomic_write`].
//!
//! # Backends
//!
//! - [`MemStorage`]: RAM-backed, always available; used by tests and for
//!   RAM-disk deployments.
//! - [`FsStorage`]: a directory on the host filesystem (feature `std`).

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use q_common::constants::TEMP_SUFFIX;
use q_common::Error;

/// Named-blob storage with atomic rename
pub trait Storage {
    /// Read up to `buf.len()` bytes starting at `offset`
    ///
    /// Returns the number of bytes read; `0` means end of blob.
    fn read_at(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, Error>;

    /// Size of a blob in bytes
    fn size(&self, path: &str) -> Result<u64, Error>;

    /// Create or truncate a blob with `data` (parent directories are implied)
    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), Error>;

    /// Append `data` to a blob, creating it if absent
    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), Error>;

    /// Atomically move a blob or directory tree
    ///
    /// An existing blob at `to` is replaced. An existing directory at `to`
    /// makes the call fail with `StorageRenameFailed`.
    fn rename(&mut self, from: &str, to: &str) -> Result<(), Error>;

    /// Delete a blob or directory tree; deleting nothing succeeds
    fn remove(&mut self, path: &str) -> Result<(), Error>;

    /// Check whether a blob or non-empty directory exists at `path`
    fn exists(&self, path: &str) -> bool;

    /// List blobs below `dir`, recursively, as sorted relative paths
    fn list(&self, dir: &str) -> Result<Vec<String>, Error>;

    /// Read a whole blob
    fn read(&self, path: &str) -> Result<Vec<u8>, Error> {
        let size = usize::try_from(self.size(path)?).map_err(|_| Error::StorageReadFailed)?;
        let mut data = alloc::vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            let n = self.read_at(path, filled as u64, &mut data[filled..])?;
            if n == 0 {
                return Err(Error::StorageReadFailed);
            }
            filled += n;
        }
        Ok(data)
    }
}

/// Join a slot directory and a relative path
#[must_use]
pub fn join(dir: &str, rel: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), rel.trim_start_matches('/'))
}

/// Replace `path` with `data` so that a reset leaves either the old or the
/// new content, never a torn blob
///
/// The data is written to `path.tmp` first and then renamed over `path`.
pub fn atomic_write<S: Storage + ?Sized>(storage: &mut S, path: &str, data: &[u8]) -> Result<(), Error> {
    let temp = format!("{path}{TEMP_SUFFIX}");
    storage.write(&temp, data)?;
    storage.rename(&temp, path)
}

// ============================================================================
// In-memory backend
// ============================================================================

/// RAM-backed storage
///
/// Directories are implicit: a directory exists while at least one blob
/// lives below it. Every mutating call bumps [`MemStorage::mutations`].
#[derive(Debug, Clone, Default)]
pub struct MemStorage {
    blobs: BTreeMap<String, Vec<u8>>,
    mutations: u64,
}

impl MemStorage {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful mutating calls so far
    #[must_use]
    pub fn mutations(&self) -> u64 {
        self.mutations
    }

    /// Copy of every blob, keyed by absolute path
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.blobs.clone()
    }

    fn dir_prefix(path: &str) -> String {
        format!("{}/", path.trim_end_matches('/'))
    }

    fn is_dir(&self, path: &str) -> bool {
        let prefix = Self::dir_prefix(path);
        self.blobs
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix))
    }

    fn keys_below(&self, path: &str) -> Vec<String> {
        let prefix = Self::dir_prefix(path);
        self.blobs
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

impl Storage for MemStorage {
    fn read_at(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, Error> {
        let blob = self.blobs.get(path).ok_or(Error::StorageNotFound)?;
        let start = usize::try_from(offset).map_err(|_| Error::InvalidParameter)?;
        if start >= blob.len() {
            return Ok(0);
        }
        let n = buf.len().min(blob.len() - start);
        buf[..n].copy_from_slice(&blob[start..start + n]);
        Ok(n)
    }

    fn size(&self, path: &str) -> Result<u64, Error> {
        self.blobs
            .get(path)
            .map(|b| b.len() as u64)
            .ok_or(Error::StorageNotFound)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), Error> {
        if self.is_dir(path) {
            return Err(Error::StorageWriteFailed);
        }
        self.blobs.insert(path.to_string(), data.to_vec());
        self.mutations += 1;
        Ok(())
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), Error> {
        if self.is_dir(path) {
            return Err(Error::StorageWriteFailed);
        }
        self.blobs.entry(path.to_string()).or_default().extend_from_slice(data);
        self.mutations += 1;
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), Error> {
        if from == to || self.is_dir(to) {
            return Err(Error::StorageRenameFailed);
        }

        if let Some(blob) = self.blobs.remove(from) {
            self.blobs.insert(to.to_string(), blob);
            self.mutations += 1;
            return Ok(());
        }

        let keys = self.keys_below(from);
        if keys.is_empty() {
            return Err(Error::StorageNotFound);
        }
        if self.blobs.contains_key(to) || to.starts_with(&Self::dir_prefix(from)) {
            return Err(Error::StorageRenameFailed);
        }

        let target = to.trim_end_matches('/');
        let cut = Self::dir_prefix(from).len();
        for key in keys {
            if let Some(blob) = self.blobs.remove(&key) {
                self.blobs.insert(format!("{}/{}", target, &key[cut..]), blob);
            }
        }
        self.mutations += 1;
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), Error> {
        let mut removed = self.blobs.remove(path).is_some();
        for key in self.keys_below(path) {
            self.blobs.remove(&key);
            removed = true;
        }
        if removed {
            self.mutations += 1;
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.blobs.contains_key(path) || self.is_dir(path)
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, Error> {
        let cut = Self::dir_prefix(dir).len();
        Ok(self
            .keys_below(dir)
            .into_iter()
            .map(|k| k[cut..].to_string())
            .collect())
    }
}

// ============================================================================
// Host filesystem backend
// ============================================================================

#[cfg(feature = "std")]
pub use fs::FsStorage;

#[cfg(feature = "std")]
mod fs {
    use super::{Error, Storage};
    use alloc::string::{String, ToString};
    use alloc::vec::Vec;
    use std::fs::{self, File, OpenOptions};
    use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
    use std::path::{Component, Path, PathBuf};
    use walkdir::WalkDir;

    /// Storage rooted at a directory of the host filesystem
    ///
    /// Device paths map below the root (`/app/x` → `<root>/app/x`). Rename
    /// uses `std::fs::rename`, which is atomic within one filesystem.
    #[derive(Debug, Clone)]
    pub struct FsStorage {
        root: PathBuf,
    }

    impl FsStorage {
        /// Use `root` as the device filesystem root
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }

        /// Host path of the root directory
        #[must_use]
        pub fn root(&self) -> &Path {
            &self.root
        }

        /// Host path for a device path
        ///
        /// # Errors
        ///
        /// `Error::InvalidParameter` if the path tries to leave the root.
        pub fn resolve(&self, path: &str) -> Result<PathBuf, Error> {
            let rel = Path::new(path.trim_start_matches('/'));
            if rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
            {
                return Err(Error::InvalidParameter);
            }
            Ok(self.root.join(rel))
        }

        fn holds_blobs(dir: &Path) -> bool {
            WalkDir::new(dir)
                .min_depth(1)
                .into_iter()
                .filter_map(Result::ok)
                .any(|entry| entry.file_type().is_file())
        }

        fn ensure_parent(path: &Path) -> Result<(), Error> {
            match path.parent() {
                Some(parent) => fs::create_dir_all(parent).map_err(|_| Error::StorageWriteFailed),
                None => Ok(()),
            }
        }
    }

    fn read_error(e: &std::io::Error) -> Error {
        if e.kind() == ErrorKind::NotFound {
            Error::StorageNotFound
        } else {
            Error::StorageReadFailed
        }
    }

    impl Storage for FsStorage {
        fn read_at(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, Error> {
            let mut file = File::open(self.resolve(path)?).map_err(|e| read_error(&e))?;
            file.seek(SeekFrom::Start(offset))
                .map_err(|_| Error::StorageReadFailed)?;
            file.read(buf).map_err(|_| Error::StorageReadFailed)
        }

        fn size(&self, path: &str) -> Result<u64, Error> {
            let meta = fs::metadata(self.resolve(path)?).map_err(|e| read_error(&e))?;
            if meta.is_dir() {
                return Err(Error::StorageReadFailed);
            }
            Ok(meta.len())
        }

        fn write(&mut self, path: &str, data: &[u8]) -> Result<(), Error> {
            let target = self.resolve(path)?;
            Self::ensure_parent(&target)?;
            let mut file = File::create(&target).map_err(|_| Error::StorageWriteFailed)?;
            file.write_all(data).map_err(|_| Error::StorageWriteFailed)?;
            file.sync_all().map_err(|_| Error::StorageWriteFailed)
        }

        fn append(&mut self, path: &str, data: &[u8]) -> Result<(), Error> {
            let target = self.resolve(path)?;
            Self::ensure_parent(&target)?;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&target)
                .map_err(|_| Error::StorageWriteFailed)?;
            file.write_all(data).map_err(|_| Error::StorageWriteFailed)?;
            file.sync_data().map_err(|_| Error::StorageWriteFailed)
        }

        fn rename(&mut self, from: &str, to: &str) -> Result<(), Error> {
            let source = self.resolve(from)?;
            let target = self.resolve(to)?;
            if !self.exists(from) {
                return Err(Error::StorageNotFound);
            }
            if target.is_dir() {
                if Self::holds_blobs(&target) {
                    return Err(Error::StorageRenameFailed);
                }
                // Empty directories do not exist as far as callers can tell.
                fs::remove_dir_all(&target).map_err(|_| Error::StorageRenameFailed)?;
            }
            Self::ensure_parent(&target)?;
            fs::rename(&source, &target).map_err(|_| Error::StorageRenameFailed)
        }

        fn remove(&mut self, path: &str) -> Result<(), Error> {
            let target = self.resolve(path)?;
            let result = if target.is_dir() {
                fs::remove_dir_all(&target)
            } else {
                fs::remove_file(&target)
            };
            match result {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(_) => Err(Error::StorageDeleteFailed),
            }
        }

        fn exists(&self, path: &str) -> bool {
            self.resolve(path).is_ok_and(|p| {
                if p.is_dir() {
                    Self::holds_blobs(&p)
                } else {
                    p.is_file()
                }
            })
        }

        fn list(&self, dir: &str) -> Result<Vec<String>, Error> {
            let base = self.resolve(dir)?;
            if !base.is_dir() {
                return Ok(Vec::new());
            }
            let mut names = Vec::new();
            for entry in WalkDir::new(&base) {
                let entry = entry.map_err(|_| Error::StorageReadFailed)?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(&base)
                    .map_err(|_| Error::InternalError)?;
                let parts: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect();
                names.push(parts.join("/"));
            }
            names.sort();
            Ok(names)
        }
    }
}
