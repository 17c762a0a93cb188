// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Boot Decision Sequencer
//!
//! Runs once per reset and decides what the device does next: halt in
//! recovery mode, install a newer release and reboot, or launch the
//! installed application.
//!
//! # State Machine
//!
//! ```text
//! INIT ──► RECOVERY
//!   │
//!   ▼
//! NORMAL ──► CONNECT ──► FETCH_MANIFEST ──► COMPARE ──► UP_TO_DATE ──┐
//!   │           │              │               │                     │
//!   │           │              │               ▼                     │
//!   │           │              │             STALE ──► STAGE         │
//!   │           │              │                         │           │
//!   │           │              │                         ▼           │
//!   │           │              │                    VERIFY_ALL       │
//!   │           │              │                         │           │
//!   │           │              │                         ▼           │
//!   │           │              │       REBOOT ◄──── PROMOTE          │
//!   │           ▼              ▼                         │           │
//!   └──────────────────────► RUN_CURRENT ◄───────────────┴───────────┘
//! ```
//!
//! Any failure on the update path abandons the update for this boot and
//! falls through to `RUN_CURRENT`. Before the update check, `NORMAL`
//! repairs interrupted slot operations and rolls back when the previous
//! launches were never confirmed.
//!
//! # Crash Counting
//!
//! `RUN_CURRENT` increments the pending launch count before handing over
//! to the application. The application resets it with
//! [`q_update::mark_boot_success`]. Once the count reaches the configured
//! threshold, the next boot rolls back to `previous`.

use alloc::vec::Vec;
use core::fmt;
use core::time::Duration;

use q_common::constants::CURRENT_DIR;
use q_common::log::LogBuffer;
use q_common::{log_debug, log_error, log_info, log_warn};
use q_common::{BootConfig, DeviceConfig, Error, Version};
use q_update::{
    BootAttemptState, HttpClient, InstalledVersionRecord, Manifest, ManifestClient, PayloadStager,
    SealedSet, SlotName, StagedSet, Storage, SwapManager,
};
use q_update::slots;

use crate::boot_log::{BootLog, BootStage, ErrorCategory};
use crate::platform::{Board, StatusPattern};
use crate::recovery::{should_enter_recovery, RecoveryReason};

const MODULE: &str = "boot";

// ============================================================================
// States and Outcomes
// ============================================================================

/// Boot sequence state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    /// Reset entry, grace window
    Init,
    /// Halted for manual intervention
    Recovery,
    /// Slot repair and crash-count check
    Normal,
    /// Network association
    Connect,
    /// Manifest retrieval
    FetchManifest,
    /// Version comparison
    Compare,
    /// Installed release is current
    UpToDate,
    /// Newer release available
    Stale,
    /// Payload download
    Stage,
    /// Staging re-verification and seal
    VerifyAll,
    /// Slot promotion
    Promote,
    /// Reset into the new release
    Reboot,
    /// Launch the installed application
    RunCurrent,
}

impl BootState {
    /// Upper-case state name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Recovery => "RECOVERY",
            Self::Normal => "NORMAL",
            Self::Connect => "CONNECT",
            Self::FetchManifest => "FETCH_MANIFEST",
            Self::Compare => "COMPARE",
            Self::UpToDate => "UP_TO_DATE",
            Self::Stale => "STALE",
            Self::Stage => "STAGE",
            Self::VerifyAll => "VERIFY_ALL",
            Self::Promote => "PROMOTE",
            Self::Reboot => "REBOOT",
            Self::RunCurrent => "RUN_CURRENT",
        }
    }
}

impl fmt::Display for BootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the device does after the boot sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Halt without launching anything
    Recovery(RecoveryReason),
    /// Reset so the newly promoted release is loaded fresh
    Reboot {
        /// Release now in `current`
        version: Version,
    },
    /// Launch the application in `current`
    RunApplication {
        /// Installed release
        version: Version,
        /// Unconfirmed launches including this one
        pending_count: u32,
    },
}

// State with the data carried into it.
enum Step {
    Init,
    Recovery(RecoveryReason),
    Normal,
    Connect,
    FetchManifest,
    Compare(Manifest),
    UpToDate,
    Stale(Manifest),
    Stage(Manifest),
    VerifyAll(StagedSet),
    Promote(SealedSet),
    Reboot(Version),
    RunCurrent,
}

impl Step {
    fn state(&self) -> BootState {
        match self {
            Self::Init => BootState::Init,
            Self::Recovery(_) => BootState::Recovery,
            Self::Normal => BootState::Normal,
            Self::Connect => BootState::Connect,
            Self::FetchManifest => BootState::FetchManifest,
            Self::Compare(_) => BootState::Compare,
            Self::UpToDate => BootState::UpToDate,
            Self::Stale(_) => BootState::Stale,
            Self::Stage(_) => BootState::Stage,
            Self::VerifyAll(_) => BootState::VerifyAll,
            Self::Promote(_) => BootState::Promote,
            Self::Reboot(_) => BootState::Reboot,
            Self::RunCurrent => BootState::RunCurrent,
        }
    }
}

enum Transition {
    Next(Step),
    Done(BootOutcome),
}

// ============================================================================
// Sequencer
// ============================================================================

/// Boot sequencer
pub struct BootSequencer<'a, S: Storage, H: HttpClient> {
    storage: &'a mut S,
    http: &'a mut H,
    board: Board<'a>,
    device: Option<&'a DeviceConfig>,
    config: BootConfig,
    log: &'a mut LogBuffer,
    boot_log: BootLog,
    installed: InstalledVersionRecord,
    attempts: BootAttemptState,
    trace: Vec<BootState>,
}

impl<'a, S: Storage, H: HttpClient> BootSequencer<'a, S, H> {
    /// Create a sequencer
    ///
    /// `device` is `None` when the launcher could not load the device
    /// configuration; the update check is then skipped. Nothing is read
    /// from storage until the recovery decision has been made.
    pub fn new(
        storage: &'a mut S,
        http: &'a mut H,
        board: Board<'a>,
        device: Option<&'a DeviceConfig>,
        config: BootConfig,
        log: &'a mut LogBuffer,
    ) -> Self {
        Self {
            storage,
            http,
            board,
            device,
            config,
            log,
            boot_log: BootLog::new(),
            installed: InstalledVersionRecord::default(),
            attempts: BootAttemptState::new(config.rollback_threshold),
            trace: Vec::new(),
        }
    }

    /// States visited by the last [`run`](Self::run), in order
    #[must_use]
    pub fn trace(&self) -> &[BootState] {
        &self.trace
    }

    /// Run the boot sequence to its outcome
    ///
    /// Never fails: every error is handled by falling back to the installed
    /// application or, when there is none, to recovery mode.
    pub fn run(&mut self) -> BootOutcome {
        self.trace.clear();
        let mut step = Step::Init;
        loop {
            let state = step.state();
            self.trace.push(state);
            log_debug!(self.log, MODULE, "state {}", state);

            match self.step(step) {
                Transition::Next(next) => step = next,
                Transition::Done(outcome) => return outcome,
            }
        }
    }

    fn step(&mut self, step: Step) -> Transition {
        match step {
            Step::Init => self.init(),
            Step::Recovery(reason) => self.recovery(reason),
            Step::Normal => self.normal(),
            Step::Connect => self.connect(),
            Step::FetchManifest => self.fetch_manifest(),
            Step::Compare(manifest) => self.compare(manifest),
            Step::UpToDate => Transition::Next(Step::RunCurrent),
            Step::Stale(manifest) => {
                log_info!(
                    self.log,
                    MODULE,
                    "update {} -> {} ({} files, {} bytes)",
                    self.installed.version,
                    manifest.version(),
                    manifest.files().len(),
                    manifest.total_size()
                );
                Transition::Next(Step::Stage(manifest))
            }
            Step::Stage(manifest) => self.stage(&manifest),
            Step::VerifyAll(staged) => self.verify_all(staged),
            Step::Promote(sealed) => self.promote(sealed),
            Step::Reboot(version) => Transition::Done(BootOutcome::Reboot { version }),
            Step::RunCurrent => self.run_current(),
        }
    }

    // ------------------------------------------------------------------------
    // INIT / RECOVERY
    // ------------------------------------------------------------------------

    fn init(&mut self) -> Transition {
        self.board.indicator.show(StatusPattern::Booting);
        let reason = should_enter_recovery(
            &mut *self.board.recovery,
            &mut *self.board.delay,
            self.config.grace_window_ms,
        );
        if reason == RecoveryReason::None {
            Transition::Next(Step::Normal)
        } else {
            Transition::Next(Step::Recovery(reason))
        }
    }

    // No storage, network or launch from here.
    fn recovery(&mut self, reason: RecoveryReason) -> Transition {
        self.board.indicator.show(StatusPattern::Recovery);
        log_warn!(self.log, MODULE, "recovery mode: {}", reason.as_str());
        Transition::Done(BootOutcome::Recovery(reason))
    }

    // ------------------------------------------------------------------------
    // NORMAL
    // ------------------------------------------------------------------------

    fn normal(&mut self) -> Transition {
        self.boot_log = BootLog::load(&*self.storage);

        if self.repair_slots() == Err(Error::NoBootableApp) {
            log_warn!(self.log, MODULE, "no application installed, update check decides");
        }
        self.load_records();

        if self.attempts.is_exhausted() {
            self.rollback();
        }

        let Some(device) = self.device else {
            log_warn!(self.log, MODULE, "no device configuration, skipping update check");
            return Transition::Next(Step::RunCurrent);
        };
        if !device.check_updates_on_boot {
            log_info!(self.log, MODULE, "update check disabled");
            return Transition::Next(Step::RunCurrent);
        }
        Transition::Next(Step::Connect)
    }

    // Slot repair; failures other than an empty device go to the boot log.
    fn repair_slots(&mut self) -> Result<(), Error> {
        match SwapManager::new(&mut *self.storage, self.config.rollback_threshold).recover() {
            Ok(report) => {
                if report.changed() {
                    log_warn!(self.log, MODULE, "repaired slots: {:?}", report);
                }
                Ok(())
            }
            Err(Error::NoBootableApp) => Err(Error::NoBootableApp),
            Err(e) => {
                log_error!(self.log, MODULE, "slot repair failed: {}", e);
                self.record_failure(BootStage::SlotRecovery, e);
                Err(e)
            }
        }
    }

    fn load_records(&mut self) {
        self.installed = match InstalledVersionRecord::load(&*self.storage) {
            Ok(record) => record,
            Err(e) => {
                log_warn!(self.log, MODULE, "installed record unreadable ({}), assuming 0.0.0", e);
                InstalledVersionRecord::default()
            }
        };
        self.attempts = match BootAttemptState::load(&*self.storage, self.config.rollback_threshold) {
            Ok(attempts) => attempts,
            Err(e) => {
                log_warn!(self.log, MODULE, "boot counter unreadable ({}), resetting", e);
                BootAttemptState::new(self.config.rollback_threshold)
            }
        };
    }

    fn rollback(&mut self) {
        log_warn!(
            self.log,
            MODULE,
            "{} unconfirmed boots, rolling back",
            self.attempts.pending_count
        );

        match SwapManager::new(&mut *self.storage, self.config.rollback_threshold).rollback() {
            Ok(outcome) => {
                log_warn!(
                    self.log,
                    MODULE,
                    "rolled back {} -> {}",
                    outcome.rejected,
                    outcome.restored
                );
                if let Some(e) = outcome.bookkeeping_error {
                    log_error!(self.log, MODULE, "rollback bookkeeping failed: {}", e);
                }
                self.installed = InstalledVersionRecord {
                    version: outcome.restored,
                    rejected: Some(outcome.rejected),
                };
                self.attempts.reset();
                self.record_event(BootStage::Rollback, ErrorCategory::Rollback, 0);
            }
            Err(Error::RollbackExhausted) => {
                // Counter stays put; every boot reports this until someone intervenes.
                self.board.indicator.show(StatusPattern::Error);
                log_error!(self.log, MODULE, "rollback exhausted: no previous application");
                self.record_failure(BootStage::Rollback, Error::RollbackExhausted);
            }
            Err(e) => {
                log_error!(self.log, MODULE, "rollback failed: {}", e);
                self.record_failure(BootStage::Rollback, e);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Update path
    // ------------------------------------------------------------------------

    fn connect(&mut self) -> Transition {
        let Some(device) = self.device else {
            return Transition::Next(Step::RunCurrent);
        };
        self.board.indicator.show(StatusPattern::Updating);
        let timeout = Duration::from_millis(u64::from(self.config.wifi_timeout_ms));
        match self
            .board
            .link
            .connect(&device.wifi_ssid, &device.wifi_password, timeout)
        {
            Ok(()) => Transition::Next(Step::FetchManifest),
            Err(e) => self.abandon(BootStage::Connect, e),
        }
    }

    fn fetch_manifest(&mut self) -> Transition {
        let Some(device) = self.device else {
            return Transition::Next(Step::RunCurrent);
        };
        match ManifestClient::new(&mut *self.http, &self.config).fetch(&device.manifest_url) {
            Ok(manifest) => Transition::Next(Step::Compare(manifest)),
            Err(e) => self.abandon(BootStage::FetchManifest, e),
        }
    }

    fn compare(&mut self, manifest: Manifest) -> Transition {
        let offered = manifest.version();
        let no_app = !self.storage.exists(CURRENT_DIR);

        if no_app || self.installed.accepts(&offered) {
            return Transition::Next(Step::Stale(manifest));
        }
        if self.installed.rejected == Some(offered) {
            log_info!(self.log, MODULE, "{} was rolled back, not reinstalling", offered);
        } else {
            log_info!(
                self.log,
                MODULE,
                "up to date ({}, offered {})",
                self.installed.version,
                offered
            );
        }
        Transition::Next(Step::UpToDate)
    }

    fn stage(&mut self, manifest: &Manifest) -> Transition {
        let result = PayloadStager::new(&mut *self.storage, &mut *self.http, &self.config).stage(manifest);
        match result {
            Ok(staged) => Transition::Next(Step::VerifyAll(staged)),
            Err(e) => self.abandon(BootStage::Stage, e),
        }
    }

    fn verify_all(&mut self, staged: StagedSet) -> Transition {
        let result = PayloadStager::new(&mut *self.storage, &mut *self.http, &self.config).verify_all(staged);
        match result {
            Ok(sealed) => Transition::Next(Step::Promote(sealed)),
            Err(e) => self.abandon(BootStage::VerifyAll, e),
        }
    }

    fn promote(&mut self, sealed: SealedSet) -> Transition {
        let result = SwapManager::new(&mut *self.storage, self.config.rollback_threshold).promote(sealed);
        match result {
            Ok(outcome) => {
                if let Some(e) = outcome.bookkeeping_error {
                    log_warn!(self.log, MODULE, "promoted, but bookkeeping failed: {}", e);
                    self.record_failure(BootStage::Promote, e);
                }
                log_info!(self.log, MODULE, "promoted {}, rebooting", outcome.version);
                Transition::Next(Step::Reboot(outcome.version))
            }
            Err(e) => {
                if !self.storage.exists(CURRENT_DIR) {
                    log_error!(self.log, MODULE, "promote failed ({}), old release not restored", e);
                    // Repair towards the old release, not the staged one.
                    if let Err(clear) = slots::clear(&mut *self.storage, SlotName::Staging) {
                        log_warn!(self.log, MODULE, "could not discard staging: {}", clear);
                    }
                    if self.repair_slots().is_ok() {
                        self.load_records();
                    }
                }
                self.abandon(BootStage::Promote, e)
            }
        }
    }

    fn abandon(&mut self, stage: BootStage, error: Error) -> Transition {
        log_warn!(self.log, MODULE, "update abandoned at {:?}: {}", stage, error);
        self.record_failure(stage, error);
        Transition::Next(Step::RunCurrent)
    }

    // ------------------------------------------------------------------------
    // RUN_CURRENT
    // ------------------------------------------------------------------------

    fn run_current(&mut self) -> Transition {
        if !self.storage.exists(CURRENT_DIR) && self.repair_slots().is_ok() {
            self.load_records();
        }
        if !self.storage.exists(CURRENT_DIR) {
            self.board.indicator.show(StatusPattern::Error);
            log_error!(self.log, MODULE, "no application installed");
            self.record_failure(BootStage::RunCurrent, Error::NoBootableApp);
            return Transition::Next(Step::Recovery(RecoveryReason::NoBootableApp));
        }

        self.attempts.record_attempt();
        if let Err(e) = self.attempts.save(&mut *self.storage) {
            log_error!(self.log, MODULE, "could not persist boot counter: {}", e);
        }

        self.board.indicator.show(StatusPattern::Running);
        log_info!(
            self.log,
            MODULE,
            "launching {} (unconfirmed boots: {})",
            self.installed.version,
            self.attempts.pending_count
        );
        Transition::Done(BootOutcome::RunApplication {
            version: self.installed.version,
            pending_count: self.attempts.pending_count,
        })
    }

    // ------------------------------------------------------------------------
    // Boot log
    // ------------------------------------------------------------------------

    fn record_failure(&mut self, stage: BootStage, error: Error) {
        let version = self.installed.version;
        if let Err(e) = self.boot_log.log_failure(&mut *self.storage, stage, error, version) {
            log_warn!(self.log, MODULE, "boot log not written: {}", e);
        }
    }

    fn record_event(&mut self, stage: BootStage, category: ErrorCategory, code: u16) {
        let version = self.installed.version;
        if let Err(e) = self.boot_log.log_event(&mut *self.storage, stage, category, code, version) {
            log_warn!(self.log, MODULE, "boot log not written: {}", e);
        }
    }
}
