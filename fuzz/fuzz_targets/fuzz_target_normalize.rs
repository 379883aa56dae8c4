//! Fuzz target for hostname normalization.
//!
//! Tests that user-submitted target strings are normalized without
//! panicking, and that anything accepted matches the hostname shape.

#![no_main]

use libfuzzer_sys::fuzz_target;
use lg_core::validate::normalize_host;

fuzz_target!(|data: &str| {
    if let Some(host) = normalize_host(data) {
        assert!(!host.is_empty());
        assert!(host.contains('.'));
        assert_eq!(host, host.to_lowercase());
    }
});
