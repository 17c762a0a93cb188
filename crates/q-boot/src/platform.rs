// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Board capabilities used by the boot sequencer
//!
//! Everything the sequencer needs from the board besides storage and HTTP:
//! a blocking delay, the Wi-Fi link and a status indicator. Boards
//! implement these traits; the host launcher and the tests provide their
//! own implementations.

use core::time::Duration;

use q_common::config::WifiPassword;
use q_common::Error;

use crate::recovery::RecoveryInput;

/// Blocking delay
pub trait Delay {
    /// Block for `ms` milliseconds
    fn delay_ms(&mut self, ms: u32);
}

/// Network association (the CONNECT step)
pub trait NetworkLink {
    /// Join `ssid` and wait until the link is up or `timeout` elapses
    ///
    /// # Errors
    ///
    /// `Error::ConnectFailed` on rejection, `Error::NetworkTimeout` when the
    /// link does not come up in time.
    fn connect(&mut self, ssid: &str, password: &WifiPassword, timeout: Duration) -> Result<(), Error>;
}

// ============================================================================
// Status Indicator
// ============================================================================

/// Indicator pattern shown during boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusPattern {
    /// Indicator dark
    Off = 0,
    /// Boot sequence started
    Booting = 1,
    /// Checking for or installing an update
    Updating = 2,
    /// Application launched
    Running = 3,
    /// Update abandoned or rollback impossible
    Error = 4,
    /// Halted in recovery mode
    Recovery = 5,
}

impl From<u8> for StatusPattern {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Booting,
            2 => Self::Updating,
            3 => Self::Running,
            4 => Self::Error,
            5 => Self::Recovery,
            _ => Self::Off,
        }
    }
}

/// Visual boot status (an LED on most boards)
pub trait StatusIndicator {
    /// Switch to `pattern`
    fn show(&mut self, pattern: StatusPattern);
}

/// Indicator for boards without one
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIndicator;

impl StatusIndicator for NoIndicator {
    fn show(&mut self, _pattern: StatusPattern) {}
}

/// Board capabilities handed to the sequencer
pub struct Board<'a> {
    /// Recovery trigger input
    pub recovery: &'a mut dyn RecoveryInput,
    /// Blocking delay
    pub delay: &'a mut dyn Delay,
    /// Network association
    pub link: &'a mut dyn NetworkLink,
    /// Status indicator
    pub indicator: &'a mut dyn StatusIndicator,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_conversion() {
        assert_eq!(StatusPattern::from(2), StatusPattern::Updating);
        assert_eq!(StatusPattern::from(StatusPattern::Recovery as u8), StatusPattern::Recovery);
        assert_eq!(StatusPattern::from(200), StatusPattern::Off);
    }

    #[test]
    fn test_no_indicator_accepts_everything() {
        let mut indicator = NoIndicator;
        indicator.show(StatusPattern::Error);
        indicator.show(StatusPattern::Off);
    }
}
