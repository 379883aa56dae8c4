//! Fuzz target for stdout line transformation.
//!
//! Tests that the transformer handles arbitrary tool output without
//! panicking, for every probe kind.

#![no_main]

use libfuzzer_sys::fuzz_target;
use lg_common::ProbeKind;
use lg_core::transform::OutputTransformer;

fuzz_target!(|data: &[u8]| {
    for kind in ProbeKind::all() {
        let mut transformer = OutputTransformer::new(kind, 4, 4096);
        // Arbitrary bytes must always produce a padded line, never a panic
        let (line, _) = transformer.transform(data);
        assert!(line.display.len() >= 4096);
    }
});
