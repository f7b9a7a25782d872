//! Gas-sensor fusion engine adapter.
//!
//! Implements [`FusionEngine`] for the Bosch BSEC2 library driving a
//! BME68x on the shared I2C bus.
//!
//! - **`target_os = "espidf"`**: FFI into the `bsec_glue` ESP-IDF
//!   component (`components/bsec_glue`). The glue latches the bsec2
//!   sample callback and links the vendor's prebuilt `libalgobsec.a` and
//!   the BME68x sensor API, which are not redistributable and must be
//!   dropped into the component by the builder.
//! - **all other targets**: a deterministic model with the same
//!   warm-up behaviour, scheduling and state-blob contract.

use log::{info, warn};

use crate::app::ports::FusionEngine;
use crate::fusion::{BusHandle, BusInterface, FusedOutput, OutputId, RawSample, SampleRate, StateBlob};

#[cfg(target_os = "espidf")]
use crate::fusion::STATE_BLOB_LEN;

#[cfg(not(target_os = "espidf"))]
use crate::fusion::SUBSCRIPTION;

/// Most outputs one iteration can produce.
pub const MAX_OUTPUTS: usize = 16;

// ───────────────────────────────────────────────────────────────
// ESP-IDF: FFI to the glue component
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod ffi {
    use core::ffi::c_void;

    #[repr(C)]
    #[derive(Default)]
    pub struct GlueRaw {
        pub temperature: f32,
        pub humidity: f32,
        pub pressure: f32,
        pub gas_resistance: f32,
    }

    #[repr(C)]
    #[derive(Default, Clone, Copy)]
    pub struct GlueOutput {
        pub signal: f32,
        pub sensor_id: u8,
        pub accuracy: u8,
    }

    unsafe extern "C" {
        pub fn airnode_bsec_begin(bus: *mut c_void, spi: bool) -> bool;
        pub fn airnode_bsec_set_config(cfg: *const u8, len: usize) -> bool;
        pub fn airnode_bsec_update_subscription(ids: *const u8, n: usize, rate_hz: f32) -> bool;
        /// `n_out` holds the capacity of `out` on entry and the count on return.
        pub fn airnode_bsec_run(
            raw: *mut GlueRaw,
            out: *mut GlueOutput,
            n_out: *mut usize,
            sampled: *mut bool,
        ) -> bool;
        pub fn airnode_bsec_status() -> i32;
        pub fn airnode_bsec_get_state(buf: *mut u8, len: usize) -> bool;
        pub fn airnode_bsec_set_state(buf: *const u8, len: usize) -> bool;
        pub fn airnode_bsec_next_call_ns() -> i64;
        /// The `bsec_iaq.config` blob compiled into the component.
        pub fn airnode_bsec_config(len: *mut usize) -> *const u8;
    }
}

/// The engine configuration blob (3.3 V supply, 300 s ULP, 4 days history).
#[cfg(target_os = "espidf")]
pub fn default_config() -> &'static [u8] {
    let mut len = 0usize;
    // SAFETY: the component returns a pointer to a static array of `len` bytes.
    unsafe {
        let ptr = ffi::airnode_bsec_config(&mut len);
        if ptr.is_null() {
            return &[];
        }
        core::slice::from_raw_parts(ptr, len)
    }
}

/// BSEC keeps global state inside the vendor library; only one engine may
/// exist per program.
#[cfg(target_os = "espidf")]
pub struct BsecEngine {
    _private: (),
}

#[cfg(target_os = "espidf")]
impl BsecEngine {
    pub fn new() -> Self {
        info!("BSEC: vendor library via bsec_glue");
        Self { _private: () }
    }
}

#[cfg(target_os = "espidf")]
impl FusionEngine for BsecEngine {
    fn init(&mut self, bus: BusHandle, iface: BusInterface) -> bool {
        let spi = iface == BusInterface::Spi;
        // SAFETY: the handle came from `bring_up_bus` and outlives the program.
        unsafe { ffi::airnode_bsec_begin(bus.as_raw() as *mut core::ffi::c_void, spi) }
    }

    fn set_config(&mut self, config: &[u8]) -> bool {
        unsafe { ffi::airnode_bsec_set_config(config.as_ptr(), config.len()) }
    }

    fn update_subscription(&mut self, outputs: &[OutputId], rate: SampleRate) -> bool {
        let mut ids = [0u8; MAX_OUTPUTS];
        let n = outputs.len().min(MAX_OUTPUTS);
        for (slot, id) in ids.iter_mut().zip(outputs) {
            *slot = id.tag();
        }
        unsafe { ffi::airnode_bsec_update_subscription(ids.as_ptr(), n, rate.hz()) }
    }

    fn run(&mut self, on_sample: &mut dyn FnMut(&RawSample, &[FusedOutput])) -> bool {
        let mut raw = ffi::GlueRaw::default();
        let mut out = [ffi::GlueOutput::default(); MAX_OUTPUTS];
        let mut n_out = MAX_OUTPUTS;
        let mut sampled = false;

        let ok = unsafe {
            ffi::airnode_bsec_run(&mut raw, out.as_mut_ptr(), &mut n_out, &mut sampled)
        };
        if !ok {
            return false;
        }
        if sampled {
            let sample = RawSample {
                temperature: raw.temperature,
                humidity: raw.humidity,
                pressure: raw.pressure,
                gas_resistance: raw.gas_resistance,
            };
            let mut fused: heapless::Vec<FusedOutput, MAX_OUTPUTS> = heapless::Vec::new();
            for o in out.iter().take(n_out.min(MAX_OUTPUTS)) {
                let _ = fused.push(FusedOutput {
                    tag: o.sensor_id,
                    signal: o.signal,
                    accuracy: o.accuracy,
                });
            }
            on_sample(&sample, &fused);
        }
        true
    }

    fn status(&self) -> i32 {
        unsafe { ffi::airnode_bsec_status() }
    }

    fn get_state(&mut self, out: &mut StateBlob) -> bool {
        unsafe { ffi::airnode_bsec_get_state(out.as_bytes_mut().as_mut_ptr(), STATE_BLOB_LEN) }
    }

    fn set_state(&mut self, state: &StateBlob) -> bool {
        let ok = unsafe { ffi::airnode_bsec_set_state(state.as_bytes().as_ptr(), STATE_BLOB_LEN) };
        if !ok {
            warn!("BSEC: state rejected (status {})", self.status());
        }
        ok
    }

    fn next_call_ns(&self) -> i64 {
        unsafe { ffi::airnode_bsec_next_call_ns() }
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation model
// ───────────────────────────────────────────────────────────────

/// Samples before the first fused output appears.
#[cfg(not(target_os = "espidf"))]
pub const WARM_UP_SAMPLES: u32 = 3;

#[cfg(not(target_os = "espidf"))]
const STATE_HEADER: [u8; 4] = *b"BSIM";

#[cfg(not(target_os = "espidf"))]
static SIM_CONFIG: [u8; 12] = *b"BSIM-ULP-3V3";

#[cfg(not(target_os = "espidf"))]
pub fn default_config() -> &'static [u8] {
    &SIM_CONFIG
}

/// Status codes mirroring the vendor library's sign convention.
#[cfg(not(target_os = "espidf"))]
mod status {
    pub const OK: i32 = 0;
    pub const E_NOT_READY: i32 = -2;
    pub const E_CONFIG: i32 = -32;
    pub const E_STATE: i32 = -36;
    pub const W_TOO_EARLY: i32 = 100;
}

#[cfg(not(target_os = "espidf"))]
pub struct BsecEngine {
    now: fn() -> i64,
    attached: bool,
    configured: bool,
    subscribed: bool,
    rate: SampleRate,
    next_call_ns: i64,
    status: i32,
    /// Samples processed over the engine's whole history, restored state included.
    samples: u32,
}

#[cfg(not(target_os = "espidf"))]
impl BsecEngine {
    pub fn new() -> Self {
        Self::with_clock(super::board::sim_now_ns)
    }

    /// Engine driven by a caller-supplied clock.
    pub fn with_clock(now: fn() -> i64) -> Self {
        info!("BSEC(sim): deterministic model");
        Self {
            now,
            attached: false,
            configured: false,
            subscribed: false,
            rate: SampleRate::Ulp,
            next_call_ns: 0,
            status: status::OK,
            samples: 0,
        }
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    fn accuracy(&self) -> u8 {
        match self.samples {
            0..=9 => 1,
            10..=29 => 2,
            _ => 3,
        }
    }

    fn sample(&self) -> RawSample {
        let phase = (self.samples % 20) as f32;
        RawSample {
            temperature: 24.0 + phase * 0.05,
            humidity: 45.0 - phase * 0.1,
            pressure: 1013.2,
            gas_resistance: 120_000.0 + phase * 500.0,
        }
    }

    fn outputs(&self, raw: &RawSample) -> heapless::Vec<FusedOutput, MAX_OUTPUTS> {
        let acc = self.accuracy();
        let mut out = heapless::Vec::new();
        for id in SUBSCRIPTION {
            let signal = match id {
                OutputId::Iaq => 25.0 + (self.samples % 50) as f32,
                OutputId::RawTemperature => raw.temperature,
                OutputId::RawPressure => raw.pressure,
                OutputId::RawHumidity => raw.humidity,
                OutputId::RawGas => raw.gas_resistance,
                OutputId::StabilizationStatus | OutputId::RunInStatus => 1.0,
                OutputId::HeatCompensatedTemperature => raw.temperature - 1.5,
                OutputId::HeatCompensatedHumidity => raw.humidity + 4.0,
            };
            let _ = out.push(FusedOutput::new(id, signal, acc));
        }
        out
    }
}

#[cfg(not(target_os = "espidf"))]
impl FusionEngine for BsecEngine {
    fn init(&mut self, bus: BusHandle, _iface: BusInterface) -> bool {
        self.attached = bus.as_raw() != 0;
        self.status = if self.attached { status::OK } else { status::E_NOT_READY };
        self.attached
    }

    fn set_config(&mut self, config: &[u8]) -> bool {
        self.configured = self.attached && !config.is_empty();
        self.status = if self.configured { status::OK } else { status::E_CONFIG };
        self.configured
    }

    fn update_subscription(&mut self, outputs: &[OutputId], rate: SampleRate) -> bool {
        self.subscribed = self.configured && !outputs.is_empty();
        self.rate = rate;
        self.status = if self.subscribed { status::OK } else { status::E_NOT_READY };
        self.subscribed
    }

    fn run(&mut self, on_sample: &mut dyn FnMut(&RawSample, &[FusedOutput])) -> bool {
        if !self.subscribed {
            self.status = status::E_NOT_READY;
            return false;
        }
        let now = (self.now)();
        if now < self.next_call_ns {
            self.status = status::W_TOO_EARLY;
            return true;
        }

        self.samples = self.samples.saturating_add(1);
        self.next_call_ns = now + self.rate.period_ns();
        self.status = status::OK;

        let raw = self.sample();
        if self.samples > WARM_UP_SAMPLES {
            let outputs = self.outputs(&raw);
            on_sample(&raw, &outputs);
        } else {
            on_sample(&raw, &[]);
        }
        true
    }

    fn status(&self) -> i32 {
        self.status
    }

    fn get_state(&mut self, out: &mut StateBlob) -> bool {
        if !self.configured {
            self.status = status::E_STATE;
            return false;
        }
        *out = StateBlob::zeroed();
        let bytes = out.as_bytes_mut();
        bytes[..4].copy_from_slice(&STATE_HEADER);
        bytes[4..8].copy_from_slice(&self.samples.to_le_bytes());
        self.status = status::OK;
        true
    }

    fn set_state(&mut self, state: &StateBlob) -> bool {
        let bytes = state.as_bytes();
        if !self.configured || bytes[..4] != STATE_HEADER {
            warn!("BSEC(sim): state rejected");
            self.status = status::E_STATE;
            return false;
        }
        let mut count = [0u8; 4];
        count.copy_from_slice(&bytes[4..8]);
        self.samples = u32::from_le_bytes(count);
        self.status = status::OK;
        true
    }

    fn next_call_ns(&self) -> i64 {
        self.next_call_ns
    }
}

#[cfg(target_os = "espidf")]
impl Default for BsecEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for BsecEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
