//! Sample types and the merge rule that folds engine output into a
//! [`MergedReading`].

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Output tags
// ---------------------------------------------------------------------------

/// Outputs the node subscribes to. Discriminants are the engine's wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OutputId {
    Iaq = 1,
    RawTemperature = 6,
    RawPressure = 7,
    RawHumidity = 8,
    RawGas = 9,
    StabilizationStatus = 12,
    RunInStatus = 13,
    HeatCompensatedTemperature = 14,
    HeatCompensatedHumidity = 15,
}

impl OutputId {
    /// Map a wire tag back to a known output. Unknown tags yield `None`.
    pub const fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => Self::Iaq,
            6 => Self::RawTemperature,
            7 => Self::RawPressure,
            8 => Self::RawHumidity,
            9 => Self::RawGas,
            12 => Self::StabilizationStatus,
            13 => Self::RunInStatus,
            14 => Self::HeatCompensatedTemperature,
            15 => Self::HeatCompensatedHumidity,
            _ => return None,
        })
    }

    pub const fn tag(self) -> u8 {
        self as u8
    }
}

/// Engine sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    /// Ultra-low-power: one sample every 300 s.
    Ulp,
    /// Low-power: one sample every 3 s.
    Lp,
    /// Continuous: one sample per second.
    Continuous,
}

impl SampleRate {
    pub fn hz(self) -> f32 {
        match self {
            Self::Ulp => 1.0 / 300.0,
            Self::Lp => 1.0 / 3.0,
            Self::Continuous => 1.0,
        }
    }

    /// Nominal spacing between samples in nanoseconds.
    pub fn period_ns(self) -> i64 {
        match self {
            Self::Ulp => 300_000_000_000,
            Self::Lp => 3_000_000_000,
            Self::Continuous => 1_000_000_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine-facing samples
// ---------------------------------------------------------------------------

/// Uncompensated values straight from the physical sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawSample {
    pub temperature: f32,
    pub humidity: f32,
    /// hPa
    pub pressure: f32,
    /// Ω
    pub gas_resistance: f32,
}

/// One processed value produced by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedOutput {
    /// Wire tag; see [`OutputId`].
    pub tag: u8,
    pub signal: f32,
    /// 0 (unreliable) to 3 (high).
    pub accuracy: u8,
}

impl FusedOutput {
    pub fn new(id: OutputId, signal: f32, accuracy: u8) -> Self {
        Self {
            tag: id.tag(),
            signal,
            accuracy,
        }
    }

    pub fn id(&self) -> Option<OutputId> {
        OutputId::from_tag(self.tag)
    }
}

// ---------------------------------------------------------------------------
// MergedReading
// ---------------------------------------------------------------------------

/// The single shared snapshot of the latest environmental reading.
///
/// When `is_fused` is false, `iaq` and `iaq_accuracy` hold the zero
/// sentinel. Physical fields and `battery_mv` carry over between
/// cycles; a zero physical field means "not yet measured".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MergedReading {
    /// °C
    pub temperature: f32,
    /// %RH
    pub humidity: f32,
    /// hPa
    pub pressure: f32,
    /// Ω
    pub gas_resistance: f32,
    /// Indoor air-quality index.
    pub iaq: f32,
    /// 0–3.
    pub iaq_accuracy: u8,
    pub stabilization_status: u8,
    pub run_in_status: u8,
    pub battery_mv: u16,
    /// A sample was taken this cycle.
    pub valid: bool,
    /// The sample came from the fusion engine rather than the raw fallback.
    pub is_fused: bool,
}

impl MergedReading {
    /// Clear per-cycle flags before an iteration.
    pub fn begin_cycle(&mut self) {
        self.valid = false;
        self.is_fused = false;
        self.iaq = 0.0;
        self.iaq_accuracy = 0;
    }

    /// Raw-fallback path: the engine sampled but produced no outputs yet.
    pub fn apply_raw(&mut self, raw: &RawSample) {
        self.temperature = raw.temperature;
        self.humidity = raw.humidity;
        self.pressure = raw.pressure;
        self.gas_resistance = raw.gas_resistance;
        self.iaq = 0.0;
        self.iaq_accuracy = 0;
        self.valid = true;
        self.is_fused = false;
    }

    /// Fused path.
    ///
    /// Heat-compensated temperature and humidity always win. A raw
    /// counterpart only fills the field when the set carries no
    /// compensated value and the field has never been measured.
    pub fn apply_fused(&mut self, outputs: &[FusedOutput]) {
        let has = |id: OutputId| outputs.iter().any(|o| o.id() == Some(id));
        let hc_temperature = has(OutputId::HeatCompensatedTemperature);
        let hc_humidity = has(OutputId::HeatCompensatedHumidity);

        self.valid = true;
        self.is_fused = true;

        for out in outputs {
            let Some(id) = out.id() else { continue };
            match id {
                OutputId::Iaq => {
                    self.iaq = out.signal;
                    self.iaq_accuracy = out.accuracy;
                }
                OutputId::HeatCompensatedTemperature => self.temperature = out.signal,
                OutputId::HeatCompensatedHumidity => self.humidity = out.signal,
                OutputId::RawTemperature => {
                    if !hc_temperature && self.temperature == 0.0 {
                        self.temperature = out.signal;
                    }
                }
                OutputId::RawHumidity => {
                    if !hc_humidity && self.humidity == 0.0 {
                        self.humidity = out.signal;
                    }
                }
                OutputId::RawPressure => self.pressure = out.signal,
                OutputId::RawGas => self.gas_resistance = out.signal,
                OutputId::StabilizationStatus => self.stabilization_status = out.signal as u8,
                OutputId::RunInStatus => self.run_in_status = out.signal as u8,
            }
        }
    }
}
