//! Node configuration parameters
//!
//! All tunable parameters for the sampling node. Defaults match the
//! deployed hardware; values can be overridden via NVS.

use serde::{Deserialize, Serialize};

use crate::fusion::SampleRate;

/// Core node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    // --- Sleep tiers ---
    /// Waits shorter than this are spent busy-waiting (µs)
    pub short_wait_threshold_us: u64,
    /// Waits at or above this power the device off (µs)
    pub light_sleep_threshold_us: u64,

    // --- Drift ---
    /// An early wake inside this window is corrected by busy-waiting (µs)
    pub early_wake_window_us: u64,
    /// Lateness beyond this is logged as a timing warning (µs)
    pub late_warning_us: u64,
    /// Retry interval when the fusion session is not running (seconds)
    pub degraded_interval_secs: u32,

    // --- Checkpointing ---
    /// Durable checkpoint once every N power-off cycles
    pub durable_save_every: u8,
    /// Wall-clock years up to and including this one are "not synced"
    pub clock_valid_after_year: i32,
    /// Below this battery voltage every power-off also writes durable state (mV)
    pub low_battery_mv: u16,

    // --- Sensing ---
    /// Fusion engine sample rate
    pub sample_rate: SampleRate,
    /// Battery voltage divider ratio
    pub battery_divider: u8,

    // --- Network time ---
    pub wifi_ssid: heapless::String<32>,
    pub wifi_password: heapless::String<64>,
    pub ntp_server: heapless::String<48>,
    /// POSIX TZ string applied after sync
    pub timezone: heapless::String<32>,
    pub wifi_max_retries: u8,
    pub sntp_poll_attempts: u8,
    pub sntp_poll_interval_ms: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            // Sleep tiers
            short_wait_threshold_us: 50_000,     // 50 ms
            light_sleep_threshold_us: 10_000_000, // 10 s

            // Drift
            early_wake_window_us: 100_000, // 100 ms
            late_warning_us: 2_000_000,    // 2 s
            degraded_interval_secs: 300,   // one ULP period

            // Checkpointing
            durable_save_every: 6,
            clock_valid_after_year: 2024,
            low_battery_mv: 3300,

            // Sensing
            sample_rate: SampleRate::Ulp,
            battery_divider: 2,

            // Network time
            wifi_ssid: heapless::String::new(),
            wifi_password: heapless::String::new(),
            ntp_server: str_field("pool.ntp.org"),
            timezone: str_field("TRT-3"),
            wifi_max_retries: 5,
            sntp_poll_attempts: 10,
            sntp_poll_interval_ms: 2000,
        }
    }
}

/// Copy a literal into a fixed-capacity field, truncating if needed.
pub fn str_field<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
