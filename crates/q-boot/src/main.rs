// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Qbitel Boot Updater Host Launcher
//!
//! Runs the boot sequence against a directory that stands in for the
//! device filesystem, then launches the installed application.
//!
//! # Commands
//!
//! - `run`: boot sequence, then exec `<root>/app/app_main`. A promoted
//!   update restarts the sequence, as a device reset would.
//! - `mark-success`: confirm the running application (normally invoked by
//!   the application itself once it is healthy)
//! - `status`: print slots, records and the boot log
//!
//! # Board Mapping
//!
//! | Capability | Host implementation |
//! |------------|---------------------|
//! | Recovery input | `Q_BOOT_RECOVERY=1` in the environment |
//! | Delay | `std::thread::sleep` |
//! | Network link | none (the host is assumed online) |
//! | Indicator | pattern names on stderr |
//! | HTTP | `reqwest` blocking client |

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use std::time::Duration;

use clap::{Parser, Subcommand};

use q_boot::{
    Board, BootLog, BootOutcome, BootSequencer, Delay, NetworkLink, RecoveryInput, StatusIndicator,
    StatusPattern,
};
use q_common::config::WifiPassword;
use q_common::constants::{APP_ENTRY_NAME, CURRENT_DIR, DEVICE_CONFIG_PATH};
use q_common::log::{LogBuffer, LogEntry, LogLevel};
use q_common::{log_error, log_info, BootConfig, DeviceConfig, Error};
use q_update::slots::{self, SlotState};
use q_update::{
    mark_boot_success, BootAttemptState, ChunkSink, FsStorage, HttpClient, InstalledVersionRecord,
    Storage,
};

const MODULE: &str = "launcher";

// Body read granularity; the update core re-chunks as it needs.
const READ_CHUNK: usize = 4096;

#[derive(Parser, Debug)]
#[command(name = "q-boot", version, about = "Boot-time OTA updater launcher")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the boot sequence and launch the installed application
    Run {
        /// Device filesystem root
        #[arg(long)]
        root: PathBuf,

        /// Allow plain-http manifests and payloads
        #[arg(long)]
        dev: bool,

        /// Log every state transition
        #[arg(long, short)]
        verbose: bool,
    },
    /// Confirm that the running application booted successfully
    MarkSuccess {
        /// Device filesystem root
        #[arg(long)]
        root: PathBuf,
    },
    /// Show slot, record and boot log state
    Status {
        /// Device filesystem root
        #[arg(long)]
        root: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { root, dev, verbose } => run(&root, dev, verbose),
        Commands::MarkSuccess { root } => {
            let mut storage = FsStorage::new(root);
            match mark_boot_success(&mut storage) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("mark-success failed: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Status { root } => {
            print_status(&FsStorage::new(root));
            ExitCode::SUCCESS
        }
    }
}

fn print_entry(entry: &LogEntry) {
    eprintln!("{entry}");
}

// =============================================================================
// Run
// =============================================================================

fn run(root: &Path, dev: bool, verbose: bool) -> ExitCode {
    let mut log = LogBuffer::with_sink(print_entry);
    if verbose {
        log.set_min_level(LogLevel::Debug);
    }

    let mut storage = FsStorage::new(root);
    let config = if dev { BootConfig::DEVELOPMENT } else { BootConfig::DEFAULT };
    let device = match load_device_config(&storage) {
        Ok(device) => Some(device),
        Err(e) => {
            log_error!(log, MODULE, "device configuration unavailable: {}", e);
            None
        }
    };

    let mut http = match ReqwestClient::new() {
        Ok(http) => http,
        Err(e) => {
            eprintln!("http client init failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mut recovery = EnvRecovery;
    let mut delay = ThreadDelay;
    let mut link = HostLink;
    let mut indicator = ConsoleIndicator;

    loop {
        let board = Board {
            recovery: &mut recovery,
            delay: &mut delay,
            link: &mut link,
            indicator: &mut indicator,
        };
        let outcome =
            BootSequencer::new(&mut storage, &mut http, board, device.as_ref(), config, &mut log).run();

        match outcome {
            BootOutcome::Reboot { version } => {
                log_info!(log, MODULE, "restarting into {}", version);
            }
            BootOutcome::Recovery(reason) => {
                eprintln!("recovery mode ({}); reflash the device", reason.as_str());
                return ExitCode::from(2);
            }
            BootOutcome::RunApplication { version, .. } => {
                log_info!(log, MODULE, "running {}", version);
                return launch(&storage);
            }
        }
    }
}

fn load_device_config(storage: &FsStorage) -> Result<DeviceConfig, Error> {
    let data = storage.read(DEVICE_CONFIG_PATH).map_err(|e| match e {
        Error::StorageNotFound => Error::ConfigMissing,
        other => other,
    })?;
    DeviceConfig::from_json(&data)
}

fn launch(storage: &FsStorage) -> ExitCode {
    let entry = match storage.resolve(&format!("{CURRENT_DIR}/{APP_ENTRY_NAME}")) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("bad application path: {e}");
            return ExitCode::FAILURE;
        }
    };

    match Command::new(&entry).current_dir(storage.root()).status() {
        Ok(status) => match status.code() {
            Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
            None => ExitCode::FAILURE,
        },
        Err(e) => {
            eprintln!("failed to launch {}: {e}", entry.display());
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Status
// =============================================================================

fn describe(state: SlotState) -> String {
    match state {
        SlotState::Empty => "empty".to_string(),
        SlotState::Unsealed => "unsealed".to_string(),
        SlotState::Sealed(version) => format!("sealed {version}"),
        SlotState::Corrupted => "corrupted seal".to_string(),
    }
}

fn print_status(storage: &FsStorage) {
    let status = slots::status(storage);
    println!("slots:");
    println!("  current   {}", describe(status.current));
    println!("  staging   {}", describe(status.staging));
    println!("  previous  {}", describe(status.previous));

    match InstalledVersionRecord::load(storage) {
        Ok(record) => match record.rejected {
            Some(rejected) => println!("installed: {} (rejected {rejected})", record.version),
            None => println!("installed: {}", record.version),
        },
        Err(e) => println!("installed: unreadable ({e})"),
    }

    let threshold = BootConfig::DEFAULT.rollback_threshold;
    match BootAttemptState::load(storage, threshold) {
        Ok(attempts) => println!(
            "unconfirmed boots: {}/{}",
            attempts.pending_count, attempts.threshold
        ),
        Err(e) => println!("unconfirmed boots: unreadable ({e})"),
    }

    let boot_log = BootLog::load(storage);
    println!("boot log ({} total):", boot_log.total_failures());
    for entry in boot_log.iter() {
        println!(
            "  #{:<4} {:?} {:?} code=0x{:04x} version={}",
            entry.seq, entry.stage, entry.category, entry.error_code, entry.version
        );
    }
}

// =============================================================================
// Host Board
// =============================================================================

struct EnvRecovery;

impl RecoveryInput for EnvRecovery {
    fn is_asserted(&mut self) -> bool {
        std::env::var("Q_BOOT_RECOVERY").is_ok_and(|v| v == "1")
    }
}

struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

struct HostLink;

impl NetworkLink for HostLink {
    fn connect(&mut self, _ssid: &str, _password: &WifiPassword, _timeout: Duration) -> Result<(), Error> {
        Ok(())
    }
}

struct ConsoleIndicator;

impl StatusIndicator for ConsoleIndicator {
    fn show(&mut self, pattern: StatusPattern) {
        eprintln!("[indicator] {pattern:?}");
    }
}

// =============================================================================
// HTTP
// =============================================================================

struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    fn new() -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder().build()?;
        Ok(Self { client })
    }
}

fn map_request_error(e: &reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::NetworkTimeout
    } else if let Some(status) = e.status() {
        Error::HttpStatus(status.as_u16())
    } else {
        Error::ConnectFailed
    }
}

impl HttpClient for ReqwestClient {
    fn get(&mut self, url: &str, timeout: Duration, sink: &mut dyn ChunkSink) -> Result<(), Error> {
        let mut response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| map_request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = response.read(&mut buf).map_err(|e| match e.kind() {
                std::io::ErrorKind::TimedOut => Error::NetworkTimeout,
                _ => Error::ConnectFailed,
            })?;
            if n == 0 {
                return Ok(());
            }
            sink.accept(&buf[..n])?;
        }
    }
}
