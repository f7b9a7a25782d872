//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ FusionSession / CheckpointStore / Scheduler
//! ```
//!
//! Driven adapters (fusion engine, board, storage, network time, event
//! sinks) implement these traits. The domain consumes them via generics
//! passed at each call site, so the core never touches hardware directly
//! and every collaborator can be replaced by a recording mock in tests.
//!
//! ## Contract notes
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **StoragePort** writes MUST be committed before `write` returns.
//! - **FusionEngine::run** invokes its handler synchronously, at most once.

use crate::config::NodeConfig;
use crate::fusion::{BusHandle, BusInterface, FusedOutput, OutputId, RawSample, SampleRate, StateBlob};
use crate::power::WakeCause;

// ───────────────────────────────────────────────────────────────
// Fusion engine port (driven adapter: domain ↔ sensor fusion library)
// ───────────────────────────────────────────────────────────────

/// A sensor-fusion engine that turns raw environmental samples into
/// compensated values and an air-quality index.
///
/// The engine owns a clock-driven schedule: it decides when the physical
/// sensor is next due and reports that through [`next_call_ns`].
///
/// [`next_call_ns`]: FusionEngine::next_call_ns
pub trait FusionEngine {
    /// Attach the engine to a bus. Returns `false` if the sensor is absent.
    fn init(&mut self, bus: BusHandle, iface: BusInterface) -> bool;

    /// Apply the static configuration blob.
    fn set_config(&mut self, config: &[u8]) -> bool;

    /// Choose which outputs are produced and at what rate.
    fn update_subscription(&mut self, outputs: &[OutputId], rate: SampleRate) -> bool;

    /// Perform one iteration.
    ///
    /// When a physical sample was taken, `on_sample` is invoked exactly
    /// once with the raw values and whatever fused outputs are available
    /// (possibly none). When nothing was due it is not invoked at all.
    fn run(&mut self, on_sample: &mut dyn FnMut(&RawSample, &[FusedOutput])) -> bool;

    /// Status code of the most recent call. Zero is OK, positive values
    /// are warnings, negative values are errors.
    fn status(&self) -> i32;

    /// Export the calibration state.
    fn get_state(&mut self, out: &mut StateBlob) -> bool;

    /// Import a previously exported calibration state.
    fn set_state(&mut self, state: &StateBlob) -> bool;

    /// Engine-clock timestamp (ns) at which the next `run` is due.
    fn next_call_ns(&self) -> i64;
}

// ───────────────────────────────────────────────────────────────
// Board ports (driven adapters: domain → SoC peripherals)
// ───────────────────────────────────────────────────────────────

/// Wall-clock access.
pub trait ClockPort {
    /// Current time in nanoseconds, in the same domain the fusion engine
    /// uses for [`FusionEngine::next_call_ns`].
    fn now_ns(&self) -> i64;

    /// Current local calendar year. An unsynced RTC reports 1970.
    fn calendar_year(&self) -> i32;
}

/// Wake classification and the two sleep primitives that return.
///
/// Full power-off does not return and is therefore not part of this
/// port; the binary performs it after the scheduler hands back control.
pub trait PowerPort {
    fn wake_cause(&self) -> WakeCause;

    /// Spin the CPU for `us` microseconds.
    fn busy_wait_us(&mut self, us: u64);

    /// Enter light sleep for `us` microseconds; RAM and peripherals survive.
    fn light_sleep_us(&mut self, us: u64);
}

/// Sensor bus bring-up.
pub trait BusPort {
    /// Bring up the shared sensor bus. `None` when the bus cannot be created.
    fn bring_up_bus(&mut self) -> Option<BusHandle>;
}

/// Battery voltage sampling.
pub trait BatteryPort {
    /// Battery voltage in millivolts, divider already applied.
    fn read_battery_mv(&mut self) -> Result<u16, BatteryError>;
}

/// Everything the scheduler needs from the board in one bound.
pub trait BoardPort: ClockPort + PowerPort + BusPort + BatteryPort {}

impl<T: ClockPort + PowerPort + BusPort + BatteryPort> BoardPort for T {}

// ───────────────────────────────────────────────────────────────
// Network time port
// ───────────────────────────────────────────────────────────────

/// Synchronises the wall clock from the network.
pub trait TimeSyncPort {
    /// Blocks until the clock is set or the attempt budget is exhausted.
    fn sync_time(&mut self) -> Result<(), TimeSyncError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / display)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log,
/// display, radio, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists node configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges should be rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`NodeConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<NodeConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &NodeConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for checkpoints and config.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic: no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively.
pub trait StoragePort {
    /// Read a value into `buf`. Returns the stored length.
    ///
    /// A value longer than `buf` yields [`StorageError::SizeMismatch`].
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value and commit it.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Stored value does not have the expected length.
    SizeMismatch,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

/// Errors from [`BatteryPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryError {
    /// The ADC unit was never configured.
    NotInitialized,
    /// The conversion failed.
    AdcReadFailed,
}

/// Errors from [`TimeSyncPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSyncError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    /// The station never associated within the retry budget.
    ConnectionFailed,
    /// SNTP did not complete within the poll budget.
    SntpTimeout,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::SizeMismatch => write!(f, "stored size mismatch"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for BatteryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "ADC not initialized"),
            Self::AdcReadFailed => write!(f, "ADC read failed"),
        }
    }
}

impl core::fmt::Display for TimeSyncError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::SntpTimeout => write!(f, "SNTP sync timed out"),
        }
    }
}
