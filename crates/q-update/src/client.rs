// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Manifest retrieval

use alloc::vec::Vec;
use core::time::Duration;

use q_common::{BootConfig, Error};

use crate::manifest::Manifest;
use crate::transport::{check_url, HttpClient};

/// Fetches and parses the release manifest
///
/// One attempt per call; retry policy belongs to the caller.
pub struct ManifestClient<'a, H: HttpClient> {
    http: &'a mut H,
    timeout: Duration,
    max_size: usize,
    allow_insecure: bool,
}

impl<'a, H: HttpClient> ManifestClient<'a, H> {
    /// Create a client using the limits in `config`
    pub fn new(http: &'a mut H, config: &BootConfig) -> Self {
        Self {
            http,
            timeout: Duration::from_millis(u64::from(config.http_timeout_ms)),
            max_size: config.max_manifest_size,
            allow_insecure: config.allow_insecure_http,
        }
    }

    /// Retrieve the manifest at `url`
    ///
    /// # Errors
    ///
    /// - `InvalidUrl` before any request is made
    /// - transport errors (`HttpStatus`, `NetworkTimeout`, `ConnectFailed`)
    /// - `ResponseTooLarge` when the body exceeds the configured limit
    /// - any `Manifest*` parse error
    pub fn fetch(&mut self, url: &str) -> Result<Manifest, Error> {
        check_url(url, self.allow_insecure)?;

        let limit = self.max_size;
        let mut body = Vec::new();
        let mut collect = |chunk: &[u8]| {
            if body.len() + chunk.len() > limit {
                return Err(Error::ResponseTooLarge);
            }
            body.extend_from_slice(chunk);
            Ok(())
        };
        self.http.get(url, self.timeout, &mut collect)?;

        Manifest::from_json(&body)
    }
}
