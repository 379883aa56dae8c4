//! Exit codes for the `lg` CLI.
//!
//! Exit codes communicate the probe outcome without requiring output
//! parsing:
//! - 0-3: operational outcomes (parse outcome from code, not output)
//! - 10-19: user/environment errors

use crate::dispatch::ProbeStatus;
use lg_common::{Error, ErrorCategory};

/// Stable exit codes for `lg` operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Probe ran to completion.
    Completed = 0,

    /// Trace aborted early after repeated consecutive timeouts.
    Aborted = 1,

    /// Target rejected mid-stream (address family mismatch).
    Rejected = 2,

    /// Invalid arguments or target (rejected before spawn).
    ValidationError = 10,

    /// Settings file missing or invalid.
    ConfigError = 11,

    /// Probe tool could not be spawned.
    SpawnError = 12,

    /// Pipe or stream I/O failure.
    IoError = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<ProbeStatus> for ExitCode {
    fn from(status: ProbeStatus) -> Self {
        match status {
            ProbeStatus::Completed => ExitCode::Completed,
            ProbeStatus::AbortedTimeouts => ExitCode::Aborted,
            ProbeStatus::Rejected => ExitCode::Rejected,
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Validation => ExitCode::ValidationError,
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Spawn => ExitCode::SpawnError,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ExitCode::from(ProbeStatus::Completed).code(), 0);
        assert_eq!(ExitCode::from(ProbeStatus::AbortedTimeouts).code(), 1);
        assert_eq!(ExitCode::from(ProbeStatus::Rejected).code(), 2);
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            ExitCode::from(&Error::InvalidTarget("10.0.0.1".into())).code(),
            10
        );
        assert_eq!(ExitCode::from(&Error::Config("bad".into())).code(), 11);
        assert_eq!(
            ExitCode::from(&Error::Spawn {
                command: "mtr".into(),
                reason: "missing".into()
            })
            .code(),
            12
        );
    }
}
