//! Looking glass configuration loading and validation.
//!
//! This crate provides:
//! - Typed structs for the deployment settings file (TOML)
//! - Egress link definitions with per-family source addresses
//! - The operator probe allow-list
//! - External tool path overrides
//! - Semantic validation of the loaded settings

pub mod settings;
pub mod validate;

pub use settings::{EgressLink, Settings, ToolPaths};
pub use validate::validate_settings;

/// Default transport chunk size in bytes. Every delivered line is
/// padded to this width so intermediary buffering layers between the
/// engine and the client flush per line.
pub const DEFAULT_CHUNK_BYTES: usize = 4096;
