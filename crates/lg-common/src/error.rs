//! Error types for the looking glass engine.
//!
//! This module provides structured error handling with:
//! - Category classification for error grouping
//! - A single `Result` alias used across all engine crates
//!
//! Every error is handled at single-request granularity: a failed or
//! rejected probe is a terminal, user-visible outcome for that
//! submission. Nothing here is retried automatically.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for looking glass operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Target or request validation errors (rejected before any spawn).
    Validation,
    /// Settings file errors (links, allow-list, tool paths).
    Config,
    /// Process creation errors.
    Spawn,
    /// Pipe and stream I/O errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Spawn => write!(f, "spawn"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for the looking glass engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Target failed address/hostname validation. Never retried; no
    /// process is spawned for an invalid target.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Requested egress link is not configured.
    #[error("unknown egress link: {0}")]
    UnknownLink(usize),

    /// Requested probe kind is not in the operator allow-list.
    #[error("probe kind not allowed: {0}")]
    KindNotAllowed(String),

    /// Settings file is missing, unparseable, or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// The OS could not create the probe process.
    #[error("failed to spawn {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable category for this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidTarget(_) | Error::UnknownLink(_) | Error::KindNotAllowed(_) => {
                ErrorCategory::Validation
            }
            Error::Config(_) => ErrorCategory::Config,
            Error::Spawn { .. } => ErrorCategory::Spawn,
            Error::Io(_) => ErrorCategory::Io,
        }
    }

    /// True when the error is caused by the submitted request rather
    /// than the host environment.
    pub fn is_request_error(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }
}
