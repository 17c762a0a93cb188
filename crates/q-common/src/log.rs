// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Diagnostic logging for the boot updater
//!
//! A heap-free circular log: the most recent [`LOG_BUFFER_SIZE`] entries
//! are kept in RAM so the launcher (or a recovery console) can dump what
//! happened during the boot decision. An optional console sink receives
//! every accepted entry as it is written, and with the `log` feature the
//! entries are also forwarded to the `log` facade.
//!
//! # Security
//!
//! - Wi-Fi credentials must NEVER be logged

use core::fmt::{self, Write};
use heapless::{HistoryBuffer, String};

/// Maximum log message length
pub const MAX_LOG_MESSAGE_LEN: usize = 128;

/// Log buffer size (number of entries)
pub const LOG_BUFFER_SIZE: usize = 32;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    /// Errors that require out-of-band attention
    Error = 0,
    /// Abandoned operations and degraded states
    Warn = 1,
    /// Informational messages
    Info = 2,
    /// State transitions
    Debug = 3,
    /// Very verbose
    Trace = 4,
}

impl LogLevel {
    /// Get the log level name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    /// Get a short prefix for the log level
    #[must_use]
    pub const fn prefix(&self) -> char {
        match self {
            Self::Error => 'E',
            Self::Warn => 'W',
            Self::Info => 'I',
            Self::Debug => 'D',
            Self::Trace => 'T',
        }
    }

    #[cfg(feature = "log")]
    const fn to_facade(self) -> log::Level {
        match self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log entry structure
#[derive(Clone)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Sequence number within this boot (monotonic)
    pub seq: u32,
    /// Module/component name
    pub module: &'static str,
    /// Log message, truncated to [`MAX_LOG_MESSAGE_LEN`]
    pub message: String<MAX_LOG_MESSAGE_LEN>,
}

impl fmt::Debug for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:04}] {} [{}] {}",
            self.seq,
            self.level.prefix(),
            self.module,
            self.message
        )
    }
}

/// Console sink invoked for every accepted entry
pub type LogSink = fn(&LogEntry);

/// Circular log buffer
pub struct LogBuffer {
    entries: HistoryBuffer<LogEntry, LOG_BUFFER_SIZE>,
    next_seq: u32,
    min_level: LogLevel,
    sink: Option<LogSink>,
}

impl LogBuffer {
    /// Create a new empty log buffer (minimum level `Info`)
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: HistoryBuffer::new(),
            next_seq: 0,
            min_level: LogLevel::Info,
            sink: None,
        }
    }

    /// Create a log buffer that also echoes entries to `sink`
    #[must_use]
    pub fn with_sink(sink: LogSink) -> Self {
        let mut buffer = Self::new();
        buffer.sink = Some(sink);
        buffer
    }

    /// Set the minimum log level
    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Get the minimum log level
    #[must_use]
    pub const fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Check if a log level should be recorded
    #[must_use]
    pub const fn should_log(&self, level: LogLevel) -> bool {
        (level as u8) <= (self.min_level as u8)
    }

    /// Log with format arguments
    pub fn log(&mut self, level: LogLevel, module: &'static str, args: fmt::Arguments<'_>) {
        if !self.should_log(level) {
            return;
        }

        let mut message = String::<MAX_LOG_MESSAGE_LEN>::new();
        // Overlong messages are truncated at the first fragment that does not fit
        let _ = message.write_fmt(args);

        let entry = LogEntry {
            level,
            seq: self.next_seq,
            module,
            message,
        };
        self.next_seq = self.next_seq.wrapping_add(1);

        #[cfg(feature = "log")]
        log::log!(target: module, level.to_facade(), "{}", entry.message);

        if let Some(sink) = self.sink {
            sink(&entry);
        }
        self.entries.write(entry);
    }

    /// Get the number of retained entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }

    /// Clear all entries (sequence numbering continues)
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate over entries (oldest first)
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.oldest_ordered()
    }

    /// Check whether any retained entry at `level` contains `needle`
    #[must_use]
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.iter()
            .any(|e| e.level == level && e.message.as_str().contains(needle))
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Error, $module, format_args!($($arg)*))
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Warn, $module, format_args!($($arg)*))
    };
}

/// Log an informational message
#[macro_export]
macro_rules! log_info {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Info, $module, format_args!($($arg)*))
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Debug, $module, format_args!($($arg)*))
    };
}

/// Log a trace-level message
#[macro_export]
macro_rules! log_trace {
    ($buffer:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Trace, $module, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        let mut buf = LogBuffer::new();
        log_debug!(buf, "test", "hidden {}", 1);
        assert!(buf.is_empty());

        buf.set_min_level(LogLevel::Debug);
        log_debug!(buf, "test", "shown {}", 2);
        assert_eq!(buf.len(), 1);
        assert!(buf.contains(LogLevel::Debug, "shown 2"));
    }

    #[test]
    fn test_wraps_oldest_first() {
        let mut buf = LogBuffer::new();
        for i in 0..(LOG_BUFFER_SIZE as u32 + 4) {
            log_info!(buf, "test", "entry {}", i);
        }
        assert_eq!(buf.len(), LOG_BUFFER_SIZE);
        let first = buf.iter().next().map(|e| e.seq);
        assert_eq!(first, Some(4));
    }

    #[test]
    fn test_message_truncated() {
        let mut buf = LogBuffer::new();
        let long = [b'x'; MAX_LOG_MESSAGE_LEN * 2];
        let long = core::str::from_utf8(&long).unwrap_or("");
        log_info!(buf, "test", "{}", long);
        let entry = buf.iter().next();
        assert!(entry.map_or(0, |e| e.message.len()) <= MAX_LOG_MESSAGE_LEN);
    }
}
