// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Updater configuration
//!
//! Two layers:
//!
//! - [`DeviceConfig`]: provisioned per device (`/secrets.json`), loaded once
//!   at boot by the launcher. Never mutated by the update core.
//! - [`BootConfig`]: compile-time policy for the boot sequence.

use alloc::string::String;
use core::fmt;

use serde::Deserialize;
use zeroize::Zeroize;

use crate::errors::Error;

/// Wi-Fi passphrase, wiped from memory on drop
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct WifiPassword(String);

impl WifiPassword {
    /// Wrap a passphrase
    #[must_use]
    pub fn new(secret: String) -> Self {
        Self(secret)
    }

    /// Expose the passphrase to the network link
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Drop for WifiPassword {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for WifiPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WifiPassword(<redacted>)")
    }
}

const fn default_check_updates() -> bool {
    true
}

/// Per-device configuration
///
/// Unknown keys are ignored so the same file can carry settings for the
/// application.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Wi-Fi network name
    pub wifi_ssid: String,
    /// Wi-Fi passphrase
    pub wifi_password: WifiPassword,
    /// Absolute URL of the release manifest
    pub manifest_url: String,
    /// Run the update check on boot (defaults to `true`)
    #[serde(default = "default_check_updates")]
    pub check_updates_on_boot: bool,
}

impl DeviceConfig {
    /// Parse the configuration document
    ///
    /// # Errors
    ///
    /// `Error::ConfigInvalid` on malformed JSON or a missing required key.
    pub fn from_json(data: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(data).map_err(|_| Error::ConfigInvalid)
    }
}

/// Boot sequence policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    /// Delay before the recovery input is sampled
    pub grace_window_ms: u32,
    /// Unconfirmed boots tolerated before rolling back
    pub rollback_threshold: u32,
    /// Wi-Fi association timeout
    pub wifi_timeout_ms: u32,
    /// Per-request HTTP timeout (manifest and each payload file)
    pub http_timeout_ms: u32,
    /// Storage I/O chunk size for streaming verification
    pub chunk_size: usize,
    /// Largest accepted manifest body
    pub max_manifest_size: usize,
    /// Accept `http://` manifest URLs
    pub allow_insecure_http: bool,
}

impl BootConfig {
    /// Production boot configuration
    pub const DEFAULT: Self = Self {
        grace_window_ms: 2000,
        rollback_threshold: 3,
        wifi_timeout_ms: 20_000,
        http_timeout_ms: 15_000,
        chunk_size: 1024,
        max_manifest_size: 16 * 1024,
        allow_insecure_http: false,
    };

    /// Development boot configuration (plain http allowed)
    pub const DEVELOPMENT: Self = Self {
        allow_insecure_http: true,
        ..Self::DEFAULT
    };
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let json = br#"{
            "wifi_ssid": "greenhouse",
            "wifi_password": "hunter2",
            "manifest_url": "https://example.invalid/ota/manifest.json",
            "check_updates_on_boot": false,
            "ngenic_token": "ignored"
        }"#;
        let cfg = DeviceConfig::from_json(json).unwrap();
        assert_eq!(cfg.wifi_ssid, "greenhouse");
        assert_eq!(cfg.wifi_password.expose(), "hunter2");
        assert!(!cfg.check_updates_on_boot);
    }

    #[test]
    fn test_check_updates_defaults_true() {
        let json = br#"{"wifi_ssid":"a","wifi_password":"b","manifest_url":"https://h/m.json"}"#;
        assert!(DeviceConfig::from_json(json).unwrap().check_updates_on_boot);
    }

    #[test]
    fn test_missing_key_is_invalid() {
        let json = br#"{"wifi_ssid":"a","manifest_url":"https://h/m.json"}"#;
        assert_eq!(DeviceConfig::from_json(json).err(), Some(Error::ConfigInvalid));
    }

    #[test]
    fn test_development_allows_http() {
        assert!(!BootConfig::DEFAULT.allow_insecure_http);
        assert!(BootConfig::DEVELOPMENT.allow_insecure_http);
        assert_eq!(BootConfig::DEVELOPMENT.rollback_threshold, 3);
    }
}
