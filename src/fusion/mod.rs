//! Fusion session: one engine, its bring-up sequence and the per-cycle
//! iteration that updates the shared [`MergedReading`].
//!
//! ```text
//!   initialize(bus, restore)
//!     │ init(bus, I2C) ──✗──▶ SessionError::Init
//!     │ set_config     ──✗──▶ SessionError::Config
//!     │ restore(engine)        (best effort, never fails the session)
//!     │ subscribe      ──✗──▶ SessionError::Subscription
//!     ▼
//!   ready ──▶ run_once(reading) ──▶ handler ──▶ fused │ raw fallback
//! ```

mod reading;

use log::{debug, info, warn};

use crate::app::ports::FusionEngine;
use crate::error::SessionError;

pub use reading::{FusedOutput, MergedReading, OutputId, RawSample, SampleRate};

/// Size of the engine's opaque calibration state.
pub const STATE_BLOB_LEN: usize = 221;

/// Outputs requested from the engine on every bring-up.
pub const SUBSCRIPTION: [OutputId; 9] = [
    OutputId::Iaq,
    OutputId::RawTemperature,
    OutputId::RawPressure,
    OutputId::RawHumidity,
    OutputId::RawGas,
    OutputId::StabilizationStatus,
    OutputId::RunInStatus,
    OutputId::HeatCompensatedTemperature,
    OutputId::HeatCompensatedHumidity,
];

// ---------------------------------------------------------------------------
// Handles and blobs
// ---------------------------------------------------------------------------

/// Opaque handle to an initialised sensor bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusHandle(usize);

impl BusHandle {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }
}

/// How the sensor is attached to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusInterface {
    I2c,
    Spi,
}

/// The engine's calibration state, copied verbatim between tiers.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct StateBlob(pub [u8; STATE_BLOB_LEN]);

impl StateBlob {
    pub const fn zeroed() -> Self {
        Self([0; STATE_BLOB_LEN])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl core::fmt::Debug for StateBlob {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "StateBlob({:02x?}..)", &self.0[..8])
    }
}

// ---------------------------------------------------------------------------
// FusionSession
// ---------------------------------------------------------------------------

pub struct FusionSession<E: FusionEngine> {
    engine: E,
    config: &'static [u8],
    rate: SampleRate,
    ready: bool,
}

impl<E: FusionEngine> FusionSession<E> {
    pub fn new(engine: E, config: &'static [u8], rate: SampleRate) -> Self {
        Self {
            engine,
            config,
            rate,
            ready: false,
        }
    }

    /// Bring the engine up on `bus`.
    ///
    /// `restore` runs after the configuration is applied and before the
    /// subscription, which is the only point at which the engine accepts
    /// imported state. It reports its own outcome; nothing it does can
    /// fail the session.
    pub fn initialize<F>(&mut self, bus: Option<BusHandle>, restore: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut E),
    {
        self.ready = false;

        let Some(bus) = bus else {
            warn!("Fusion: no bus handle");
            return Err(SessionError::Init);
        };
        if !self.engine.init(bus, BusInterface::I2c) {
            warn!("Fusion: engine init failed (status {})", self.engine.status());
            return Err(SessionError::Init);
        }
        if !self.engine.set_config(self.config) {
            warn!("Fusion: config rejected (status {})", self.engine.status());
            return Err(SessionError::Config);
        }

        restore(&mut self.engine);

        if !self.engine.update_subscription(&SUBSCRIPTION, self.rate) {
            warn!("Fusion: subscription rejected (status {})", self.engine.status());
            return Err(SessionError::Subscription);
        }

        info!("Fusion: session ready ({:?})", self.rate);
        self.ready = true;
        Ok(())
    }

    /// One engine iteration folded into `reading`.
    ///
    /// If the engine decides nothing is due, `reading` keeps whatever
    /// the caller left in it (normally the cleared state from
    /// [`MergedReading::begin_cycle`]).
    pub fn run_once(&mut self, reading: &mut MergedReading) -> Result<(), SessionError> {
        if !self.ready {
            return Err(SessionError::NotInitialized);
        }

        let ok = self.engine.run(&mut |raw, outputs| {
            if outputs.is_empty() {
                debug!("Fusion: no outputs yet, using raw sample");
                reading.apply_raw(raw);
            } else {
                reading.apply_fused(outputs);
            }
        });

        let status = self.engine.status();
        if !ok {
            return Err(SessionError::Run(status));
        }
        if status != 0 {
            warn!("Fusion: engine status {}", status);
        }
        Ok(())
    }

    /// Engine-clock time (ns) at which the next iteration is due.
    pub fn next_due_time_ns(&self) -> i64 {
        self.engine.next_call_ns()
    }

    pub fn next_due_time_ms(&self) -> i64 {
        self.engine.next_call_ns() / 1_000_000
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Direct engine access for checkpoint transfers.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}
