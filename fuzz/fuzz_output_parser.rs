//! Fuzz target for the `iscsi-ls` output parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_output_parser
//!
//! The tool's output is untrusted; parsing and target selection must never
//! panic, whatever bytes it prints.

#![no_main]

use libfuzzer_sys::fuzz_target;

use iscsi_command_core::translator::{luns_for_target, parse_targets};

fuzz_target!(|data: &[u8]| {
    if let Ok(targets) = parse_targets(data) {
        let wanted = targets.first().map(|t| t.target.clone()).unwrap_or_default();
        let _ = luns_for_target(targets, &wanted);
    }
});
