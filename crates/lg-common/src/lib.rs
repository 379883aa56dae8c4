//! Looking glass shared types and errors.
//!
//! This crate provides foundational types shared across the engine:
//! - Probe kinds, address families, and the validated `ProbeRequest`
//! - Reserved sentinel strings understood by the display layer
//! - Common error types

pub mod error;
pub mod probe;

pub use error::{Error, ErrorCategory, Result};
pub use probe::{
    AddressFamily, ProbeKind, ProbeRequest, ToolKind, DEFAULT_FAIL_THRESHOLD, SENTINEL_REJECTED,
    SENTINEL_TRACE_ABORTED,
};
