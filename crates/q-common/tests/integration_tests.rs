// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Integration tests for q-common
//!
//! Tests for error codes and taxonomy, version handling, configuration
//! parsing and the diagnostic log buffer.

mod error_tests {
    use q_common::{Error, ErrorKind};
    use std::collections::HashSet;

    const ALL: [Error; 27] = [
        Error::ConnectFailed,
        Error::NetworkTimeout,
        Error::HttpStatus(500),
        Error::InvalidUrl,
        Error::ResponseTooLarge,
        Error::ManifestMalformed,
        Error::ManifestMissingField,
        Error::ManifestInvalidVersion,
        Error::ManifestInvalidHash,
        Error::ManifestInvalidPath,
        Error::ManifestEmpty,
        Error::ManifestDuplicatePath,
        Error::HashMismatch,
        Error::SizeMismatch,
        Error::StorageReadFailed,
        Error::StorageWriteFailed,
        Error::StorageRenameFailed,
        Error::StorageDeleteFailed,
        Error::StorageNotFound,
        Error::StorageCorrupted,
        Error::RollbackExhausted,
        Error::NoBootableApp,
        Error::ConfigMissing,
        Error::ConfigInvalid,
        Error::InvalidParameter,
        Error::InvalidState,
        Error::InternalError,
    ];

    #[test]
    fn test_error_codes_unique() {
        let codes: HashSet<u16> = ALL.iter().map(Error::code).collect();
        assert_eq!(codes.len(), ALL.len());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::HashMismatch.to_string(), "[0x0301] SHA-256 mismatch");
        assert_eq!(
            Error::HttpStatus(404).to_string(),
            "[0x0103] unexpected HTTP status 404"
        );
    }

    #[test]
    fn test_every_error_has_a_kind() {
        let network = ALL.iter().filter(|e| e.kind() == ErrorKind::Network).count();
        let manifest = ALL.iter().filter(|e| e.kind() == ErrorKind::ManifestParse).count();
        assert_eq!(network, 5);
        assert_eq!(manifest, 7);
        assert_eq!(
            ALL.iter().filter(|e| e.kind() == ErrorKind::RollbackExhausted).count(),
            1
        );
    }
}

mod version_tests {
    use q_common::{Error, Version};

    #[test]
    fn test_version_from_str() {
        let v: Version = "0.1.2".parse().unwrap();
        assert_eq!(v, Version::new(0, 1, 2));
        assert_eq!(v.to_string(), "0.1.2");
    }

    #[test]
    fn test_version_serde_as_string() {
        let v = Version::new(1, 4, 0);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"1.4.0\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_version_serde_rejects_malformed() {
        assert!(serde_json::from_str::<Version>("\"1.4\"").is_err());
        assert!(serde_json::from_str::<Version>("140").is_err());
    }

    #[test]
    fn test_equal_is_not_greater() {
        let a = Version::parse("0.1.2").unwrap();
        let b = Version::parse(" 0.1.2 ").unwrap();
        assert!(!a.is_greater_than(&b));
        assert_eq!(Version::parse("0.1"), Err(Error::ManifestInvalidVersion));
    }
}

mod config_tests {
    use q_common::{BootConfig, DeviceConfig, Error};

    #[test]
    fn test_password_redacted() {
        let json = br#"{"wifi_ssid":"lab","wifi_password":"s3cret","manifest_url":"https://h/m.json"}"#;
        let cfg = DeviceConfig::from_json(json).unwrap();
        let dbg = format!("{cfg:?}");
        assert!(dbg.contains("lab"));
        assert!(!dbg.contains("s3cret"));
    }

    #[test]
    fn test_not_json() {
        assert_eq!(
            DeviceConfig::from_json(b"wifi_ssid=lab").err(),
            Some(Error::ConfigInvalid)
        );
    }

    #[test]
    fn test_boot_defaults() {
        let cfg = BootConfig::default();
        assert_eq!(cfg.grace_window_ms, 2000);
        assert_eq!(cfg.rollback_threshold, 3);
        assert_eq!(cfg.chunk_size, 1024);
    }
}

mod log_tests {
    use q_common::log::{LogBuffer, LogEntry, LogLevel};
    use q_common::{log_error, log_info, log_warn};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static SEEN: AtomicUsize = AtomicUsize::new(0);

    fn count_sink(_: &LogEntry) {
        SEEN.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_sink_receives_accepted_entries() {
        let mut buf = LogBuffer::with_sink(count_sink);
        log_info!(buf, "boot", "one");
        log_warn!(buf, "boot", "two");
        buf.set_min_level(LogLevel::Error);
        log_info!(buf, "boot", "filtered");
        log_error!(buf, "boot", "three");
        assert_eq!(SEEN.load(Ordering::SeqCst), 3);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_entry_format() {
        let mut buf = LogBuffer::new();
        log_warn!(buf, "stager", "abandoned: {}", "hash");
        let line = buf.iter().next().map(ToString::to_string).unwrap();
        assert_eq!(line, "[0000] W [stager] abandoned: hash");
    }

    #[test]
    fn test_clear_keeps_sequence() {
        let mut buf = LogBuffer::new();
        log_info!(buf, "m", "a");
        buf.clear();
        assert!(buf.is_empty());
        log_info!(buf, "m", "b");
        assert_eq!(buf.iter().next().map(|e| e.seq), Some(1));
    }
}
