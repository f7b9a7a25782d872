//! Fuzz target: persisted `NodeConfig` decoding
//!
//! The config blob comes straight from flash, so it may be truncated or
//! corrupted. Verifies:
//! - `postcard::from_bytes` never panics on arbitrary input
//! - Any config that decodes and passes `validate_config` survives a
//!   save / load cycle through `NvsAdapter` unchanged
//!
//! cargo fuzz run fuzz_config_decode

#![no_main]

use libfuzzer_sys::fuzz_target;

use airnode::adapters::nvs::{NvsAdapter, validate_config};
use airnode::app::ports::ConfigPort;
use airnode::config::NodeConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(cfg) = postcard::from_bytes::<NodeConfig>(data) else {
        return;
    };
    if validate_config(&cfg).is_err() {
        return;
    }

    let Ok(nvs) = NvsAdapter::new() else {
        return;
    };
    nvs.save(&cfg).expect("valid config must persist");
    assert_eq!(nvs.load().expect("persisted config must load"), cfg);
});
