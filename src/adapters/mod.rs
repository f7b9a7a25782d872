//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements         | Connects to                  |
//! |-------------|--------------------|------------------------------|
//! | `board`     | ClockPort          | RTC / `gettimeofday`         |
//! |             | PowerPort          | `esp_sleep_*`, ROM delay     |
//! |             | BusPort            | I2C master bus               |
//! |             | BatteryPort        | ADC1 oneshot + calibration   |
//! | `bsec`      | FusionEngine       | BSEC2 via `bsec_glue`        |
//! | `log_sink`  | EventSink          | Serial log output            |
//! | `nvs`       | ConfigPort         | NVS / in-memory store        |
//! |             | StoragePort        |                              |
//! | `retained`  | (arena owner)      | RTC no-init RAM              |
//! | `time_sync` | TimeSyncPort       | WiFi STA + SNTP              |

pub mod board;
pub mod bsec;
pub mod log_sink;
pub mod nvs;
pub mod retained;
pub mod time_sync;
