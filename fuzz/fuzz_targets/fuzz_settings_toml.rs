//! Fuzz target for settings file parsing.
//!
//! Tests that TOML settings parsing handles arbitrary input without
//! panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use lg_config::Settings;

fuzz_target!(|data: &str| {
    // Try to parse as TOML - should never panic, only return an error
    let _ = toml::from_str::<Settings>(data);
});
