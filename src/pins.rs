//! GPIO / peripheral pin assignments for the air-quality node board.
//!
//! Single source of truth: every adapter references this module rather
//! than hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Sensor bus (I2C master, shared by the gas sensor and the display)
// ---------------------------------------------------------------------------

pub const I2C_PORT: i32 = 0;
pub const I2C_SDA_GPIO: i32 = 20;
pub const I2C_SCL_GPIO: i32 = 19;

// ---------------------------------------------------------------------------
// Battery sense (ADC1, 1:2 resistive divider)
// ---------------------------------------------------------------------------

/// ADC1 channel 1 (GPIO 1 on ESP32-C6).
pub const VBAT_ADC_CHANNEL: u32 = 1;

// ---------------------------------------------------------------------------
// Peripheral power gate
// ---------------------------------------------------------------------------

/// Display/sensor rail enable; driven LOW and held through light sleep.
pub const PERIPH_POWER_GPIO: i32 = 15;
