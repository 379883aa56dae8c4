//! Fuzz target for stderr resolution-failure scanning.

#![no_main]

use libfuzzer_sys::fuzz_target;
use lg_common::ProbeKind;
use lg_core::transform::OutputTransformer;

fuzz_target!(|data: &[u8]| {
    let transformer = OutputTransformer::new(ProbeKind::Ping, 4, 4096);
    // Should never panic, only return Some for resolution failures
    let _ = transformer.scan_stderr(data);
});
