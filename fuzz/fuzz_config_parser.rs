//! Fuzz target for the configuration parsers.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary input to both the YAML and TOML front ends, including
//! validation, looking for panics or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;

use iscsi_command_config::AppConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = AppConfig::parse_yaml(s);
        let _ = AppConfig::parse_toml(s);
    }
});
