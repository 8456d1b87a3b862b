//! Simulation journal
//!
//! Diagnostics produced by a run (trace output, `log` measures, unhandled
//! exceptions, stop requests) are collected as [`LogRecord`]s stamped with
//! virtual time, and forwarded to `tracing` so a host can attach any
//! subscriber.

use crate::{Pid, SimTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Log level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// One diagnostic of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Virtual time of emission
    pub time: SimTime,
    pub level: LogLevel,
    /// Emitting process, if any
    pub pid: Option<Pid>,
    pub message: String,
}

impl LogRecord {
    pub fn new(time: SimTime, level: LogLevel, pid: Option<Pid>, message: impl Into<String>) -> Self {
        Self {
            time,
            level,
            pid,
            message: message.into(),
        }
    }

    /// Forward the record to the `tracing` facade
    pub(crate) fn emit(&self) {
        let time = self.time.secs();
        let pid = self.pid.map(|p| p.raw());
        match self.level {
            LogLevel::Debug => tracing::debug!(time, pid = ?pid, "{}", self.message),
            LogLevel::Info => tracing::info!(time, pid = ?pid, "{}", self.message),
            LogLevel::Warn => tracing::warn!(time, pid = ?pid, "{}", self.message),
            LogLevel::Error => tracing::error!(time, pid = ?pid, "{}", self.message),
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.time, self.level)?;
        if let Some(pid) = self.pid {
            write!(f, " {}", pid)?;
        }
        write!(f, " {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let record = LogRecord::new(SimTime(3661.0), LogLevel::Warn, Some(Pid(2)), "unhandled exception 'crash'");
        assert_eq!(
            record.to_string(),
            "01:01:01.000 [WARN] pid:2 unhandled exception 'crash'"
        );
        let record = LogRecord::new(SimTime(0.0), LogLevel::Info, None, "stop");
        assert_eq!(record.to_string(), "00:00:00.000 [INFO] stop");
    }

    #[test]
    fn test_level_order() {
        assert!(LogLevel::Debug < LogLevel::Warn);
        assert!(LogLevel::Error > LogLevel::Info);
    }
}
