// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Integration tests for q-update
//!
//! Drives the full update pipeline (fetch, stage, verify, promote) against
//! an in-memory server and storage, including power loss at every storage
//! mutation during promotion and rollback.

mod support {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use q_common::{Error, Version};
    use q_update::{ChunkSink, Digest, HttpClient, MemStorage, Storage};

    /// In-memory release server
    #[derive(Default)]
    pub struct FakeServer {
        pub routes: BTreeMap<String, Result<Vec<u8>, Error>>,
        pub requests: Vec<String>,
    }

    impl FakeServer {
        pub fn serve(&mut self, url: &str, body: &[u8]) {
            self.routes.insert(url.to_string(), Ok(body.to_vec()));
        }

        pub fn fail(&mut self, url: &str, error: Error) {
            self.routes.insert(url.to_string(), Err(error));
        }

        /// Publish a release and its manifest at `https://ota.test/manifest.json`
        pub fn publish(&mut self, version: &str, files: &[(&str, &[u8])]) -> String {
            let mut entries = Vec::new();
            for (path, body) in files {
                let url = format!("https://ota.test/{version}/{path}");
                self.serve(&url, body);
                entries.push(format!(
                    r#"{{"path":"{path}","url":"{url}","sha256":"{}","size":{}}}"#,
                    Digest::of(body),
                    body.len()
                ));
            }
            let manifest = format!(r#"{{"version":"{version}","files":[{}]}}"#, entries.join(","));
            self.serve(MANIFEST_URL, manifest.as_bytes());
            manifest
        }
    }

    impl HttpClient for FakeServer {
        fn get(&mut self, url: &str, _timeout: Duration, sink: &mut dyn ChunkSink) -> Result<(), Error> {
            self.requests.push(url.to_string());
            match self.routes.get(url) {
                Some(Ok(body)) => {
                    for chunk in body.chunks(3) {
                        sink.accept(chunk)?;
                    }
                    Ok(())
                }
                Some(Err(e)) => Err(*e),
                None => Err(Error::HttpStatus(404)),
            }
        }
    }

    pub const MANIFEST_URL: &str = "https://ota.test/manifest.json";

    /// Storage that loses power after `budget` mutations
    pub struct PowerCut<'a> {
        pub inner: &'a mut MemStorage,
        pub budget: usize,
    }

    impl PowerCut<'_> {
        fn spend(&mut self) -> Result<(), Error> {
            if self.budget == 0 {
                return Err(Error::StorageWriteFailed);
            }
            self.budget -= 1;
            Ok(())
        }
    }

    impl Storage for PowerCut<'_> {
        fn read_at(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, Error> {
            self.inner.read_at(path, offset, buf)
        }
        fn size(&self, path: &str) -> Result<u64, Error> {
            self.inner.size(path)
        }
        fn write(&mut self, path: &str, data: &[u8]) -> Result<(), Error> {
            self.spend()?;
            self.inner.write(path, data)
        }
        fn append(&mut self, path: &str, data: &[u8]) -> Result<(), Error> {
            self.spend()?;
            self.inner.append(path, data)
        }
        fn rename(&mut self, from: &str, to: &str) -> Result<(), Error> {
            self.spend()?;
            self.inner.rename(from, to)
        }
        fn remove(&mut self, path: &str) -> Result<(), Error> {
            self.spend()?;
            self.inner.remove(path)
        }
        fn exists(&self, path: &str) -> bool {
            self.inner.exists(path)
        }
        fn list(&self, dir: &str) -> Result<Vec<String>, Error> {
            self.inner.list(dir)
        }
    }

    /// Files of a slot directory excluding its seal
    pub fn slot_files(storage: &MemStorage, dir: &str) -> BTreeMap<String, Vec<u8>> {
        storage
            .list(dir)
            .unwrap()
            .into_iter()
            .filter(|p| p != ".slot.json")
            .map(|p| {
                let body = storage.read(&format!("{dir}/{p}")).unwrap();
                (p, body)
            })
            .collect()
    }

    pub fn release(files: &[(&str, &[u8])]) -> BTreeMap<String, Vec<u8>> {
        files.iter().map(|(p, b)| ((*p).to_string(), b.to_vec())).collect()
    }

    pub fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }
}

mod pipeline_tests {
    use super::support::*;
    use q_common::{BootConfig, Error};
    use q_update::slots::{self, SlotName};
    use q_update::{InstalledVersionRecord, ManifestClient, MemStorage, PayloadStager, Storage, SwapManager};

    const OLD: &[(&str, &[u8])] = &[("app_main.py", b"print('old')"), ("lib/util.py", b"A = 1")];
    const NEW: &[(&str, &[u8])] = &[("app_main.py", b"print('new')"), ("lib/util.py", b"A = 2")];

    fn install_old(storage: &mut MemStorage, server: &mut FakeServer) {
        server.publish("0.1.1", OLD);
        update(storage, server).unwrap();
    }

    fn update(storage: &mut MemStorage, server: &mut FakeServer) -> Result<(), Error> {
        let config = BootConfig::DEFAULT;
        let manifest = ManifestClient::new(server, &config).fetch(MANIFEST_URL)?;
        let mut stager = PayloadStager::new(storage, server, &config);
        let staged = stager.stage(&manifest)?;
        let sealed = stager.verify_all(staged)?;
        let outcome = SwapManager::new(storage, config.rollback_threshold).promote(sealed)?;
        assert_eq!(outcome.bookkeeping_error, None);
        Ok(())
    }

    #[test]
    fn test_update_replaces_current() {
        let mut storage = MemStorage::new();
        let mut server = FakeServer::default();
        install_old(&mut storage, &mut server);

        server.publish("0.1.2", NEW);
        update(&mut storage, &mut server).unwrap();

        assert_eq!(slot_files(&storage, "/app"), release(NEW));
        assert_eq!(slot_files(&storage, "/app_prev"), release(OLD));
        assert!(!storage.exists("/next"));
        let record = InstalledVersionRecord::load(&storage).unwrap();
        assert_eq!(record.version, v("0.1.2"));
    }

    #[test]
    fn test_hash_mismatch_leaves_current() {
        let mut storage = MemStorage::new();
        let mut server = FakeServer::default();
        install_old(&mut storage, &mut server);

        server.publish("0.1.2", NEW);
        server.serve("https://ota.test/0.1.2/lib/util.py", b"A = 3");
        assert_eq!(update(&mut storage, &mut server), Err(Error::HashMismatch));

        assert_eq!(slot_files(&storage, "/app"), release(OLD));
        assert!(!storage.exists("/next"));
        assert_eq!(
            InstalledVersionRecord::load(&storage).unwrap().version,
            v("0.1.1")
        );
    }

    #[test]
    fn test_unreachable_server_changes_nothing() {
        let mut storage = MemStorage::new();
        let mut server = FakeServer::default();
        install_old(&mut storage, &mut server);
        let before = storage.snapshot();

        server.fail(MANIFEST_URL, Error::NetworkTimeout);
        assert_eq!(update(&mut storage, &mut server), Err(Error::NetworkTimeout));
        assert_eq!(storage.snapshot(), before);
    }

    #[test]
    fn test_download_error_midway_is_fail_fast() {
        let mut storage = MemStorage::new();
        let mut server = FakeServer::default();
        install_old(&mut storage, &mut server);

        server.publish("0.1.2", NEW);
        server.fail("https://ota.test/0.1.2/app_main.py", Error::HttpStatus(500));
        server.requests.clear();

        assert_eq!(update(&mut storage, &mut server), Err(Error::HttpStatus(500)));
        assert_eq!(
            server.requests,
            [MANIFEST_URL, "https://ota.test/0.1.2/app_main.py"]
        );
        assert_eq!(slots::status(&storage).staging, q_update::SlotState::Empty);
    }

    #[test]
    fn test_first_install_has_no_previous() {
        let mut storage = MemStorage::new();
        let mut server = FakeServer::default();
        install_old(&mut storage, &mut server);
        assert!(!slots::is_present(&storage, SlotName::Previous));
        assert_eq!(
            SwapManager::new(&mut storage, 3).rollback(),
            Err(Error::RollbackExhausted)
        );
    }

    #[test]
    fn test_rollback_restores_old_release() {
        let mut storage = MemStorage::new();
        let mut server = FakeServer::default();
        install_old(&mut storage, &mut server);
        server.publish("0.1.2", NEW);
        update(&mut storage, &mut server).unwrap();

        let outcome = SwapManager::new(&mut storage, 3).rollback().unwrap();
        assert_eq!(outcome.restored, v("0.1.1"));
        assert_eq!(slot_files(&storage, "/app"), release(OLD));
        assert_eq!(slot_files(&storage, "/app_prev"), release(NEW));

        let record = InstalledVersionRecord::load(&storage).unwrap();
        assert!(!record.accepts(&v("0.1.2")));
        assert!(record.accepts(&v("0.1.3")));
    }
}

mod interruption_tests {
    use super::support::*;
    use q_common::BootConfig;
    use q_update::slots::{self, SlotName};
    use q_update::{
        InstalledVersionRecord, ManifestClient, MemStorage, PayloadStager, SealedSet, SwapManager,
    };

    const OLD: &[(&str, &[u8])] = &[("app_main.py", b"v1 main"), ("cfg.json", b"{}")];
    const NEW: &[(&str, &[u8])] = &[("app_main.py", b"v2 main"), ("extra.py", b"x")];

    fn sealed_update(storage: &mut MemStorage, server: &mut FakeServer, version: &str, files: &[(&str, &[u8])]) -> SealedSet {
        let config = BootConfig::DEFAULT;
        server.publish(version, files);
        let manifest = ManifestClient::new(server, &config).fetch(MANIFEST_URL).unwrap();
        let mut stager = PayloadStager::new(storage, server, &config);
        let staged = stager.stage(&manifest).unwrap();
        stager.verify_all(staged).unwrap()
    }

    fn base() -> (MemStorage, FakeServer) {
        let mut storage = MemStorage::new();
        let mut server = FakeServer::default();
        let sealed = sealed_update(&mut storage, &mut server, "1.0.0", OLD);
        SwapManager::new(&mut storage, 3).promote(sealed).unwrap();
        (storage, server)
    }

    /// After recovery, `current` holds exactly one complete release and the
    /// record agrees with it.
    fn assert_consistent(storage: &mut MemStorage) -> String {
        SwapManager::new(storage, 3).recover().unwrap();
        let files = slot_files(storage, "/app");
        let version = slots::get(storage, SlotName::Current).unwrap().unwrap().version;
        let expected = if files == release(OLD) {
            "1.0.0"
        } else if files == release(NEW) {
            "2.0.0"
        } else {
            panic!("mixed release in current: {:?}", files.keys());
        };
        assert_eq!(version, v(expected));
        assert_eq!(InstalledVersionRecord::load(storage).unwrap().version, version);
        assert!(slots::verify_contents(storage, SlotName::Current, 16).is_ok());
        expected.to_string()
    }

    #[test]
    fn test_power_loss_during_promote() {
        let mut saw_new = false;
        let mut saw_old = false;
        for budget in 0..12 {
            let (mut storage, mut server) = base();
            let sealed = sealed_update(&mut storage, &mut server, "2.0.0", NEW);
            {
                let mut cut = PowerCut { inner: &mut storage, budget };
                let _ = SwapManager::new(&mut cut, 3).promote(sealed);
            }
            match assert_consistent(&mut storage).as_str() {
                "1.0.0" => saw_old = true,
                _ => saw_new = true,
            }
        }
        assert!(saw_old && saw_new);
    }

    #[test]
    fn test_power_loss_during_staging() {
        for budget in 0..8 {
            let (mut storage, mut server) = base();
            server.publish("2.0.0", NEW);
            let config = BootConfig::DEFAULT;
            let manifest = ManifestClient::new(&mut server, &config).fetch(MANIFEST_URL).unwrap();
            {
                let mut cut = PowerCut { inner: &mut storage, budget };
                let mut stager = PayloadStager::new(&mut cut, &mut server, &config);
                if let Ok(staged) = stager.stage(&manifest) {
                    let _ = stager.verify_all(staged);
                }
            }
            assert_eq!(assert_consistent(&mut storage), "1.0.0");
        }
    }

    #[test]
    fn test_power_loss_during_rollback() {
        for budget in 0..10 {
            let (mut storage, mut server) = base();
            let sealed = sealed_update(&mut storage, &mut server, "2.0.0", NEW);
            SwapManager::new(&mut storage, 3).promote(sealed).unwrap();
            {
                let mut cut = PowerCut { inner: &mut storage, budget };
                let _ = SwapManager::new(&mut cut, 3).rollback();
            }
            let version = assert_consistent(&mut storage);
            if version == "1.0.0" {
                let record = InstalledVersionRecord::load(&storage).unwrap();
                assert_eq!(record.rejected, Some(v("2.0.0")), "budget {budget}");
                assert_eq!(slot_files(&storage, "/app_prev"), release(NEW));
            }
        }
    }

    #[test]
    fn test_recover_is_idempotent() {
        let (mut storage, _server) = base();
        SwapManager::new(&mut storage, 3).recover().unwrap();
        let before = storage.mutations();
        let report = SwapManager::new(&mut storage, 3).recover().unwrap();
        assert!(!report.changed());
        assert_eq!(storage.mutations(), before);
    }
}

#[cfg(feature = "std")]
mod fs_storage_tests {
    use q_common::Error;
    use q_update::{atomic_write, FsStorage, Storage};

    #[test]
    fn test_directory_rename_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FsStorage::new(dir.path());
        storage.write("/next/app_main.py", b"main").unwrap();
        storage.write("/next/lib/util.py", b"util").unwrap();

        storage.rename("/next", "/app").unwrap();
        assert!(!storage.exists("/next"));
        assert_eq!(storage.list("/app").unwrap(), ["app_main.py", "lib/util.py"]);
        assert_eq!(storage.read("/app/lib/util.py").unwrap(), b"util");
    }

    #[test]
    fn test_rename_onto_directory_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FsStorage::new(dir.path());
        storage.write("/app/a", b"1").unwrap();
        storage.write("/next/a", b"2").unwrap();
        assert_eq!(storage.rename("/next", "/app"), Err(Error::StorageRenameFailed));
    }

    #[test]
    fn test_atomic_write_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FsStorage::new(dir.path());
        atomic_write(&mut storage, "/installed.json", b"{}").unwrap();
        atomic_write(&mut storage, "/installed.json", b"{\"a\":1}").unwrap();
        assert_eq!(storage.read("/installed.json").unwrap(), b"{\"a\":1}");
        assert!(!storage.exists("/installed.json.tmp"));

        storage.remove("/installed.json").unwrap();
        storage.remove("/installed.json").unwrap();
        assert_eq!(storage.read("/installed.json"), Err(Error::StorageNotFound));
    }

    #[test]
    fn test_empty_directory_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("app/lib")).unwrap();
        let mut storage = FsStorage::new(dir.path());
        assert!(!storage.exists("/app"));

        storage.write("/app_prev/app_main.py", b"main").unwrap();
        storage.rename("/app_prev", "/app").unwrap();
        assert!(storage.exists("/app"));
        assert_eq!(storage.list("/app").unwrap(), ["app_main.py"]);
    }

    #[test]
    fn test_paths_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        assert_eq!(storage.resolve("/../etc/passwd"), Err(Error::InvalidParameter));
    }
}
