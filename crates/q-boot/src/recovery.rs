// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Recovery Mode Entry
//!
//! Recovery mode is a manual escape hatch: holding the recovery input (a
//! button on most boards) during the grace window at reset makes the device
//! halt before touching storage or the network, so it can be reflashed over
//! a development interface.
//!
//! # Sampling
//!
//! The input is sampled exactly once, after the grace window has elapsed.
//! The window gives the operator time to press the button after power-on.

use crate::platform::Delay;

/// Boolean recovery trigger
pub trait RecoveryInput {
    /// Check whether the input is currently asserted
    fn is_asserted(&mut self) -> bool;
}

// ============================================================================
// Recovery Reason
// ============================================================================

/// Reason for entering recovery mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecoveryReason {
    /// No recovery needed (normal boot)
    None = 0,
    /// Recovery input held during the grace window
    ButtonPressed = 1,
    /// No slot holds a launchable application
    NoBootableApp = 2,
}

impl From<u8> for RecoveryReason {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::ButtonPressed,
            2 => Self::NoBootableApp,
            _ => Self::None,
        }
    }
}

impl RecoveryReason {
    /// Short description for diagnostics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ButtonPressed => "recovery input held",
            Self::NoBootableApp => "no bootable application",
        }
    }
}

/// Wait out the grace window, then sample the recovery input once
pub fn should_enter_recovery(
    input: &mut dyn RecoveryInput,
    delay: &mut dyn Delay,
    grace_window_ms: u32,
) -> RecoveryReason {
    delay.delay_ms(grace_window_ms);
    if input.is_asserted() {
        RecoveryReason::ButtonPressed
    } else {
        RecoveryReason::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Button {
        held: bool,
        samples: u32,
    }

    impl RecoveryInput for Button {
        fn is_asserted(&mut self) -> bool {
            self.samples += 1;
            self.held
        }
    }

    #[derive(Default)]
    struct Clock {
        elapsed_ms: u32,
    }

    impl Delay for Clock {
        fn delay_ms(&mut self, ms: u32) {
            self.elapsed_ms += ms;
        }
    }

    #[test]
    fn test_recovery_reason_conversion() {
        assert_eq!(RecoveryReason::from(0), RecoveryReason::None);
        assert_eq!(RecoveryReason::from(1), RecoveryReason::ButtonPressed);
        assert_eq!(RecoveryReason::from(255), RecoveryReason::None);
    }

    #[test]
    fn test_samples_once_after_grace_window() {
        let mut button = Button { held: true, samples: 0 };
        let mut clock = Clock::default();
        let reason = should_enter_recovery(&mut button, &mut clock, 2000);
        assert_eq!(reason, RecoveryReason::ButtonPressed);
        assert_eq!(button.samples, 1);
        assert_eq!(clock.elapsed_ms, 2000);
    }

    #[test]
    fn test_released_button_boots_normally() {
        let mut button = Button { held: false, samples: 0 };
        let mut clock = Clock::default();
        assert_eq!(
            should_enter_recovery(&mut button, &mut clock, 0),
            RecoveryReason::None
        );
    }
}
