// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Release manifest
//!
//! A manifest is the JSON document describing one release:
//!
//! ```json
//! {
//!   "version": "0.1.2",
//!   "files": [
//!     { "path": "app_main.py", "url": "https://host/0.1.2/app_main.py",
//!       "sha256": "<64 hex>", "size": 1834 }
//!   ]
//! }
//! ```
//!
//! Parsing yields a fully validated [`Manifest`]; nothing downstream
//! re-checks versions, digests or paths. Unknown keys are ignored.

use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;

use q_common::constants::{MAX_FILE_PATH_LEN, MAX_MANIFEST_FILES, SLOT_SEAL_NAME};
use q_common::{Error, Version};
use serde::Deserialize;

use crate::transport::check_url;
use crate::verification::Digest;

/// One payload file of a release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the slot root, `/`-separated, no leading slash
    pub path: String,
    /// Absolute download URL
    pub url: String,
    /// Expected digest of the file contents
    pub sha256: Digest,
    /// Declared length in bytes
    pub size: u64,
}

/// Validated release manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    version: Version,
    files: Vec<FileEntry>,
}

// Wire shape. Every field is optional so that an absent key can be told
// apart from a value of the wrong type.
#[derive(Deserialize)]
struct RawManifest {
    version: Option<String>,
    files: Option<Vec<RawFileEntry>>,
}

#[derive(Deserialize)]
struct RawFileEntry {
    path: Option<String>,
    url: Option<String>,
    sha256: Option<String>,
    size: Option<u64>,
}

impl Manifest {
    /// Parse and validate a manifest body
    ///
    /// # Errors
    ///
    /// - `ManifestMalformed`: not JSON, wrong value types, bad URL, too many files
    /// - `ManifestMissingField`: a required key is absent or null
    /// - `ManifestInvalidVersion`: version is not `MAJOR.MINOR.PATCH`
    /// - `ManifestInvalidHash`: a digest is not 64 hex characters
    /// - `ManifestInvalidPath`: a path is empty, escapes the slot or is reserved
    /// - `ManifestEmpty`: the file list is empty
    /// - `ManifestDuplicatePath`: two entries share a path
    pub fn from_json(body: &[u8]) -> Result<Self, Error> {
        let raw: RawManifest =
            serde_json::from_slice(body).map_err(|_| Error::ManifestMalformed)?;

        let version = Version::parse(&raw.version.ok_or(Error::ManifestMissingField)?)?;
        let raw_files = raw.files.ok_or(Error::ManifestMissingField)?;

        if raw_files.is_empty() {
            return Err(Error::ManifestEmpty);
        }
        if raw_files.len() > MAX_MANIFEST_FILES {
            return Err(Error::ManifestMalformed);
        }

        let mut seen = BTreeSet::new();
        let mut files = Vec::with_capacity(raw_files.len());
        for raw_entry in raw_files {
            let entry = FileEntry::from_raw(raw_entry)?;
            if !seen.insert(entry.path.clone()) {
                return Err(Error::ManifestDuplicatePath);
            }
            files.push(entry);
        }

        Ok(Self { version, files })
    }

    /// Release version
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Payload files in manifest order
    #[must_use]
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Sum of declared file sizes
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

impl FileEntry {
    fn from_raw(raw: RawFileEntry) -> Result<Self, Error> {
        let path = raw.path.ok_or(Error::ManifestMissingField)?;
        let url = raw.url.ok_or(Error::ManifestMissingField)?;
        let sha256 = raw.sha256.ok_or(Error::ManifestMissingField)?;
        let size = raw.size.ok_or(Error::ManifestMissingField)?;

        let path = normalize_path(&path)?;
        // Scheme policy is applied by the stager; here only the shape.
        check_url(&url, true).map_err(|_| Error::ManifestMalformed)?;

        Ok(Self {
            path,
            url,
            sha256: Digest::from_hex(&sha256)?,
            size,
        })
    }
}

/// Reduce a manifest path to its slot-relative form
///
/// A single leading `/` is dropped. The result must be non-empty, contain
/// only normal components and not collide with the slot seal.
fn normalize_path(path: &str) -> Result<String, Error> {
    let rel = path.strip_prefix('/').unwrap_or(path);
    if rel.is_empty() || rel.len() > MAX_FILE_PATH_LEN || rel.contains('\\') {
        return Err(Error::ManifestInvalidPath);
    }
    if rel
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(Error::ManifestInvalidPath);
    }
    if rel == SLOT_SEAL_NAME || rel.ends_with(q_common::constants::TEMP_SUFFIX) {
        return Err(Error::ManifestInvalidPath);
    }
    Ok(String::from(rel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    const HASH: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    fn one_file(path: &str) -> String {
        format!(
            r#"{{"version":"0.1.2","files":[{{"path":"{path}","url":"https://h/f","sha256":"{HASH}","size":3}}]}}"#
        )
    }

    #[test]
    fn test_parse_valid() {
        let m = Manifest::from_json(one_file("/lib/util.py").as_bytes()).unwrap();
        assert_eq!(m.version(), Version::new(0, 1, 2));
        assert_eq!(m.files()[0].path, "lib/util.py");
        assert_eq!(m.total_size(), 3);
    }

    #[test]
    fn test_missing_size() {
        let body = format!(
            r#"{{"version":"0.1.2","files":[{{"path":"a","url":"https://h/a","sha256":"{HASH}"}}]}}"#
        );
        assert_eq!(Manifest::from_json(body.as_bytes()), Err(Error::ManifestMissingField));
    }

    #[test]
    fn test_missing_version() {
        assert_eq!(
            Manifest::from_json(br#"{"files":[]}"#),
            Err(Error::ManifestMissingField)
        );
    }

    #[test]
    fn test_wrong_types_malformed() {
        assert_eq!(Manifest::from_json(b"not json"), Err(Error::ManifestMalformed));
        assert_eq!(
            Manifest::from_json(br#"{"version":"1.0.0","files":{}}"#),
            Err(Error::ManifestMalformed)
        );
    }

    #[test]
    fn test_rejects_escaping_paths() {
        for bad in ["", "/", "../boot.py", "lib/../../x", "a//b", SLOT_SEAL_NAME, "a\\b"] {
            assert_eq!(
                Manifest::from_json(one_file(bad).as_bytes()),
                Err(Error::ManifestInvalidPath),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_empty_file_list() {
        assert_eq!(
            Manifest::from_json(br#"{"version":"1.0.0","files":[]}"#),
            Err(Error::ManifestEmpty)
        );
    }

    #[test]
    fn test_duplicate_after_normalization() {
        let body = format!(
            r#"{{"version":"1.0.0","files":[
                {{"path":"a.py","url":"https://h/1","sha256":"{HASH}","size":1}},
                {{"path":"/a.py","url":"https://h/2","sha256":"{HASH}","size":1}}]}}"#
        );
        assert_eq!(Manifest::from_json(body.as_bytes()), Err(Error::ManifestDuplicatePath));
    }

    #[test]
    fn test_payload_url_needs_scheme_and_host() {
        for bad in ["https://", "https:///a.py", "ftp://h/a.py", "h/a.py"] {
            let body = format!(
                r#"{{"version":"1.0.0","files":[{{"path":"a.py","url":"{bad}","sha256":"{HASH}","size":1}}]}}"#
            );
            assert_eq!(Manifest::from_json(body.as_bytes()), Err(Error::ManifestMalformed), "{bad}");
        }
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let body = format!(
            r#"{{"version":"1.0.0","channel":"beta","files":[
                {{"path":"a.py","url":"https://h/1","sha256":"{HASH}","size":1,"mode":420}}]}}"#
        );
        assert!(Manifest::from_json(body.as_bytes()).is_ok());
    }
}
