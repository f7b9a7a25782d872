//! ESP32-C6 board adapter.
//!
//! Implements the board-facing ports in one place because they share the
//! SoC: [`ClockPort`], [`PowerPort`], [`BusPort`] and [`BatteryPort`].
//!
//! - **`target_os = "espidf"`**: wall clock via `gettimeofday`, sleep via
//!   `esp_sleep_*`, I2C master bus, ADC1 oneshot with curve-fitting
//!   calibration, CPU frequency scaling via `esp_pm_configure`.
//! - **`not(target_os = "espidf")`**: a virtual clock that sleeps advance
//!   instantly, plus injectable wall clock, wake cause and battery ADC.

use log::{info, warn};

use crate::app::ports::{BatteryError, BatteryPort, BusPort, ClockPort, PowerPort};
use crate::fusion::BusHandle;
use crate::power::WakeCause;

#[cfg(target_os = "espidf")]
use crate::pins;
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Full-scale reading of the 12-bit ADC.
const ADC_FULL_SCALE: u32 = 4095;
/// Input range at 12 dB attenuation (mV).
const ADC_RANGE_MV: u32 = 3300;

/// Pin voltage of an uncalibrated conversion.
pub fn uncalibrated_mv(raw: i32) -> u32 {
    raw.max(0) as u32 * ADC_RANGE_MV / ADC_FULL_SCALE
}

/// Battery voltage from the pin voltage behind a `divider`:1 divider.
pub fn battery_from_pin_mv(pin_mv: u32, divider: u8) -> u16 {
    (pin_mv * u32::from(divider.max(1))).min(u32::from(u16::MAX)) as u16
}

// ───────────────────────────────────────────────────────────────
// Simulation hooks
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use core::sync::atomic::{AtomicI64, AtomicU8, AtomicU16, Ordering};

    use crate::power::WakeCause;

    static WALL_SECS: AtomicI64 = AtomicI64::new(0);
    /// Time spent in simulated waits and sleeps since start-up.
    static ELAPSED_NS: AtomicI64 = AtomicI64::new(0);
    static WAKE: AtomicU8 = AtomicU8::new(0);
    static BATTERY_RAW: AtomicU16 = AtomicU16::new(2400);

    pub fn set_wall_clock(secs: i64) {
        WALL_SECS.store(secs, Ordering::Relaxed);
    }

    pub fn wall_clock() -> i64 {
        WALL_SECS.load(Ordering::Relaxed)
    }

    pub fn advance(ns: i64) {
        ELAPSED_NS.fetch_add(ns, Ordering::Relaxed);
    }

    pub fn now_ns() -> i64 {
        WALL_SECS.load(Ordering::Relaxed) * 1_000_000_000 + ELAPSED_NS.load(Ordering::Relaxed)
    }

    pub fn set_wake_cause(cause: WakeCause) {
        let v = match cause {
            WakeCause::ColdBoot => 0,
            WakeCause::Timer => 1,
            WakeCause::External => 2,
            WakeCause::Other => 3,
        };
        WAKE.store(v, Ordering::Relaxed);
    }

    pub fn wake_cause() -> WakeCause {
        match WAKE.load(Ordering::Relaxed) {
            0 => WakeCause::ColdBoot,
            1 => WakeCause::Timer,
            2 => WakeCause::External,
            _ => WakeCause::Other,
        }
    }

    pub fn set_battery_raw(raw: u16) {
        BATTERY_RAW.store(raw, Ordering::Relaxed);
    }

    pub fn battery_raw() -> u16 {
        BATTERY_RAW.load(Ordering::Relaxed)
    }
}

/// Set the simulated wall clock (seconds since the Unix epoch).
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_wall_clock(secs: i64) {
    sim::set_wall_clock(secs);
}

/// The simulated clock, shared by every adapter that timestamps.
#[cfg(not(target_os = "espidf"))]
pub fn sim_now_ns() -> i64 {
    sim::now_ns()
}

/// Set what the next `wake_cause()` reports.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_wake_cause(cause: WakeCause) {
    sim::set_wake_cause(cause);
}

/// Set the simulated battery ADC raw value (0 – 4095).
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_battery_raw(raw: u16) {
    sim::set_battery_raw(raw);
}

// ───────────────────────────────────────────────────────────────
// Board adapter
// ───────────────────────────────────────────────────────────────

pub struct Esp32Board {
    battery_divider: u8,
    #[cfg(target_os = "espidf")]
    adc: adc_oneshot_unit_handle_t,
    #[cfg(target_os = "espidf")]
    adc_cali: Option<adc_cali_handle_t>,
    #[cfg(target_os = "espidf")]
    bus: i2c_master_bus_handle_t,
}

impl Esp32Board {
    /// Configure CPU scaling, the peripheral rail and the battery ADC.
    ///
    /// ADC failure is not fatal: battery reads then report
    /// [`BatteryError::NotInitialized`].
    #[cfg(target_os = "espidf")]
    pub fn new(battery_divider: u8) -> Self {
        // SAFETY: called once from main() before any other peripheral use.
        unsafe {
            configure_pm();
            hold_peripheral_rail();
        }
        let (adc, adc_cali) = unsafe { init_battery_adc() };
        Self {
            battery_divider,
            adc,
            adc_cali,
            bus: core::ptr::null_mut(),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(battery_divider: u8) -> Self {
        info!("Board(sim): virtual clock and peripherals");
        Self { battery_divider }
    }

    /// Arm the wake timer and power off. Only retained memory survives;
    /// the next boot reports [`WakeCause::Timer`].
    #[cfg(target_os = "espidf")]
    pub fn deep_sleep(&mut self, sleep_us: u64) -> ! {
        info!("Board: deep sleep for {} s", sleep_us / 1_000_000);
        unsafe {
            esp_sleep_enable_timer_wakeup(sleep_us);
            esp_deep_sleep_start();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn deep_sleep(&mut self, sleep_us: u64) -> ! {
        info!("Board(sim): deep sleep for {} s, exiting", sleep_us / 1_000_000);
        std::process::exit(0)
    }

    /// Idle forever at minimum power. Used when persistent storage is
    /// unusable and running would corrupt calibration.
    #[cfg(target_os = "espidf")]
    pub fn halt(&mut self) -> ! {
        loop {
            unsafe {
                esp_sleep_enable_timer_wakeup(1_000_000);
                esp_light_sleep_start();
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn halt(&mut self) -> ! {
        warn!("Board(sim): halted");
        std::process::exit(1)
    }
}

// ── ESP-IDF bring-up helpers ──────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn configure_pm() {
    let pm = esp_pm_config_t {
        max_freq_mhz: 80,
        min_freq_mhz: 40,
        light_sleep_enable: false,
    };
    let ret = unsafe { esp_pm_configure(&pm as *const esp_pm_config_t as *const core::ffi::c_void) };
    if ret != ESP_OK {
        warn!("Board: esp_pm_configure failed ({})", ret);
    }
}

#[cfg(target_os = "espidf")]
unsafe fn hold_peripheral_rail() {
    unsafe {
        gpio_reset_pin(pins::PERIPH_POWER_GPIO);
        gpio_set_direction(pins::PERIPH_POWER_GPIO, gpio_mode_t_GPIO_MODE_OUTPUT);
        gpio_set_level(pins::PERIPH_POWER_GPIO, 0);
        gpio_hold_en(pins::PERIPH_POWER_GPIO);
    }
}

#[cfg(target_os = "espidf")]
unsafe fn init_battery_adc() -> (adc_oneshot_unit_handle_t, Option<adc_cali_handle_t>) {
    let mut handle: adc_oneshot_unit_handle_t = core::ptr::null_mut();
    let init_cfg = adc_oneshot_unit_init_cfg_t {
        unit_id: adc_unit_t_ADC_UNIT_1,
        ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
        ..Default::default()
    };
    let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &mut handle) };
    if ret != ESP_OK {
        warn!("Board: ADC1 init failed ({})", ret);
        return (core::ptr::null_mut(), None);
    }

    let chan_cfg = adc_oneshot_chan_cfg_t {
        atten: adc_atten_t_ADC_ATTEN_DB_12,
        bitwidth: adc_bitwidth_t_ADC_BITWIDTH_DEFAULT,
    };
    let ret = unsafe { adc_oneshot_config_channel(handle, pins::VBAT_ADC_CHANNEL, &chan_cfg) };
    if ret != ESP_OK {
        warn!("Board: ADC1 channel config failed ({})", ret);
        return (core::ptr::null_mut(), None);
    }

    let cali_cfg = adc_cali_curve_fitting_config_t {
        unit_id: adc_unit_t_ADC_UNIT_1,
        chan: pins::VBAT_ADC_CHANNEL,
        atten: adc_atten_t_ADC_ATTEN_DB_12,
        bitwidth: adc_bitwidth_t_ADC_BITWIDTH_DEFAULT,
    };
    let mut cali: adc_cali_handle_t = core::ptr::null_mut();
    let ret = unsafe { adc_cali_create_scheme_curve_fitting(&cali_cfg, &mut cali) };
    if ret == ESP_OK {
        info!("Board: ADC1 curve-fitting calibration active");
        (handle, Some(cali))
    } else {
        warn!("Board: eFuse not burnt, battery reads uncalibrated");
        (handle, None)
    }
}

// ───────────────────────────────────────────────────────────────
// ClockPort
// ───────────────────────────────────────────────────────────────

impl ClockPort for Esp32Board {
    #[cfg(target_os = "espidf")]
    fn now_ns(&self) -> i64 {
        let mut tv = timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        unsafe { gettimeofday(&mut tv, core::ptr::null_mut()) };
        tv.tv_sec as i64 * 1_000_000_000 + tv.tv_usec as i64 * 1_000
    }

    #[cfg(not(target_os = "espidf"))]
    fn now_ns(&self) -> i64 {
        sim::now_ns()
    }

    #[cfg(target_os = "espidf")]
    fn calendar_year(&self) -> i32 {
        let mut now: time_t = 0;
        let mut tm: tm = unsafe { core::mem::zeroed() };
        unsafe {
            time(&mut now);
            if localtime_r(&now, &mut tm).is_null() {
                return 1970;
            }
        }
        tm.tm_year + 1900
    }

    #[cfg(not(target_os = "espidf"))]
    fn calendar_year(&self) -> i32 {
        const SECS_PER_YEAR: i64 = 31_556_952;
        let secs = sim::now_ns() / 1_000_000_000;
        1970 + (secs / SECS_PER_YEAR) as i32
    }
}

// ───────────────────────────────────────────────────────────────
// PowerPort
// ───────────────────────────────────────────────────────────────

impl PowerPort for Esp32Board {
    #[cfg(target_os = "espidf")]
    fn wake_cause(&self) -> WakeCause {
        #[allow(non_upper_case_globals)]
        match unsafe { esp_sleep_get_wakeup_cause() } {
            esp_sleep_source_t_ESP_SLEEP_WAKEUP_UNDEFINED => WakeCause::ColdBoot,
            esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => WakeCause::Timer,
            esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT0
            | esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT1
            | esp_sleep_source_t_ESP_SLEEP_WAKEUP_GPIO => WakeCause::External,
            _ => WakeCause::Other,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn wake_cause(&self) -> WakeCause {
        sim::wake_cause()
    }

    #[cfg(target_os = "espidf")]
    fn busy_wait_us(&mut self, us: u64) {
        use embedded_hal::delay::DelayNs;
        let mut delay = esp_idf_hal::delay::Ets;
        let mut left = us;
        while left > 0 {
            let chunk = left.min(u64::from(u32::MAX));
            delay.delay_us(chunk as u32);
            left -= chunk;
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn busy_wait_us(&mut self, us: u64) {
        sim::advance(us as i64 * 1_000);
    }

    #[cfg(target_os = "espidf")]
    fn light_sleep_us(&mut self, us: u64) {
        let ret = unsafe {
            esp_sleep_enable_timer_wakeup(us);
            esp_light_sleep_start()
        };
        if ret != ESP_OK {
            warn!("Board: light sleep rejected ({}), busy-waiting instead", ret);
            self.busy_wait_us(us);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn light_sleep_us(&mut self, us: u64) {
        sim::advance(us as i64 * 1_000);
    }
}

// ───────────────────────────────────────────────────────────────
// BusPort
// ───────────────────────────────────────────────────────────────

impl BusPort for Esp32Board {
    #[cfg(target_os = "espidf")]
    fn bring_up_bus(&mut self) -> Option<BusHandle> {
        if self.bus.is_null() {
            let mut cfg = i2c_master_bus_config_t {
                i2c_port: pins::I2C_PORT,
                sda_io_num: pins::I2C_SDA_GPIO,
                scl_io_num: pins::I2C_SCL_GPIO,
                clk_source: soc_periph_i2c_clk_src_t_I2C_CLK_SRC_DEFAULT,
                glitch_ignore_cnt: 7,
                ..Default::default()
            };
            cfg.flags.set_enable_internal_pullup(1);
            let mut handle: i2c_master_bus_handle_t = core::ptr::null_mut();
            let ret = unsafe { i2c_new_master_bus(&cfg, &mut handle) };
            if ret != ESP_OK {
                warn!("Board: I2C bus init failed ({})", ret);
                return None;
            }
            info!("Board: I2C bus up (SDA={}, SCL={})", pins::I2C_SDA_GPIO, pins::I2C_SCL_GPIO);
            self.bus = handle;
        }
        Some(BusHandle::from_raw(self.bus as usize))
    }

    #[cfg(not(target_os = "espidf"))]
    fn bring_up_bus(&mut self) -> Option<BusHandle> {
        Some(BusHandle::from_raw(0x1C))
    }
}

// ───────────────────────────────────────────────────────────────
// BatteryPort
// ───────────────────────────────────────────────────────────────

impl BatteryPort for Esp32Board {
    #[cfg(target_os = "espidf")]
    fn read_battery_mv(&mut self) -> Result<u16, BatteryError> {
        if self.adc.is_null() {
            return Err(BatteryError::NotInitialized);
        }
        let mut raw: i32 = 0;
        if unsafe { adc_oneshot_read(self.adc, pins::VBAT_ADC_CHANNEL, &mut raw) } != ESP_OK {
            return Err(BatteryError::AdcReadFailed);
        }
        let pin_mv = match self.adc_cali {
            Some(cali) => {
                let mut mv: i32 = 0;
                if unsafe { adc_cali_raw_to_voltage(cali, raw, &mut mv) } != ESP_OK {
                    return Err(BatteryError::AdcReadFailed);
                }
                mv.max(0) as u32
            }
            None => uncalibrated_mv(raw),
        };
        Ok(battery_from_pin_mv(pin_mv, self.battery_divider))
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_battery_mv(&mut self) -> Result<u16, BatteryError> {
        let pin_mv = uncalibrated_mv(i32::from(sim::battery_raw()));
        Ok(battery_from_pin_mv(pin_mv, self.battery_divider))
    }
}
