//! Semantic validation of loaded settings.

use crate::Settings;
use lg_common::{Error, Result};

/// Minimum accepted transport chunk size. Tool output lines are read
/// in 4096-byte bounded chunks; padding below that bound would split
/// lines across chunks.
const MIN_CHUNK_BYTES: usize = 1024;

/// Validate settings semantically.
///
/// Called by `Settings::load`; exposed separately so programmatically
/// built settings (tests, embedding hosts) get the same checks.
pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.links.is_empty() {
        return Err(Error::Config("at least one egress link is required".into()));
    }
    for (index, link) in settings.links.iter().enumerate() {
        if link.name.trim().is_empty() {
            return Err(Error::Config(format!("link {index} has an empty name")));
        }
    }
    if settings.allowed.is_empty() {
        return Err(Error::Config("probe allow-list is empty".into()));
    }
    if settings.fail_threshold == 0 {
        return Err(Error::Config("fail_threshold must be at least 1".into()));
    }
    if settings.chunk_bytes < MIN_CHUNK_BYTES {
        return Err(Error::Config(format!(
            "chunk_bytes must be at least {MIN_CHUNK_BYTES}"
        )));
    }
    for tool in [
        &settings.tools.ping,
        &settings.tools.traceroute,
        &settings.tools.mtr,
    ] {
        if tool.trim().is_empty() {
            return Err(Error::Config("tool paths must not be empty".into()));
        }
    }
    Ok(())
}
