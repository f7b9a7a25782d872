//! Two-tier persistence of the fusion engine's calibration state.
//!
//! ```text
//!            cost      survives            written
//!  Retained  ~free     power-off           every power-off
//!  Durable   flash     power removal       every N power-offs, power removal
//! ```
//!
//! Both tiers are gated on the wall clock: engine state carries
//! timestamps, and importing it while the clock reads 1970 (or exporting
//! state accumulated under such a clock) corrupts the calibration. With
//! an untrusted clock every transfer is skipped and nothing is touched.

mod arena;

use log::{info, warn};

use crate::app::ports::{ClockPort, FusionEngine, StorageError, StoragePort};
use crate::error::CheckpointError;
use crate::fusion::{STATE_BLOB_LEN, StateBlob};

pub use arena::{CheckpointArena, RETAINED_MAGIC, RetainedCheckpoint, ScheduleState};

/// Durable-tier NVS namespace.
pub const NAMESPACE: &str = "fusion_ckpt";
/// Durable-tier NVS key.
pub const KEY: &str = "engine_state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Retained,
    Durable,
}

/// Why a transfer did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Wall clock not synchronised.
    ClockInvalid,
    /// The tier holds no checkpoint.
    NothingSaved,
}

/// Outcome of a transfer that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Done,
    Skipped(SkipReason),
}

/// Clock-gated checkpoint policy. Stateless apart from its location and
/// the validity cutoff; the tiers and the engine are passed per call.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    namespace: &'static str,
    key: &'static str,
    valid_after_year: i32,
}

impl CheckpointStore {
    pub fn new(valid_after_year: i32) -> Self {
        Self {
            namespace: NAMESPACE,
            key: KEY,
            valid_after_year,
        }
    }

    pub fn is_clock_valid(&self, clock: &impl ClockPort) -> bool {
        clock.calendar_year() > self.valid_after_year
    }

    fn gate(&self, clock: &impl ClockPort, tier: Tier) -> Option<Transfer> {
        if self.is_clock_valid(clock) {
            None
        } else {
            info!("Checkpoint({:?}): clock not synced, skipping", tier);
            Some(Transfer::Skipped(SkipReason::ClockInvalid))
        }
    }

    // ── Retained tier ─────────────────────────────────────────

    pub fn load_from_retained<E: FusionEngine>(
        &self,
        clock: &impl ClockPort,
        arena: &CheckpointArena,
        engine: &mut E,
    ) -> Result<Transfer, CheckpointError> {
        if let Some(skip) = self.gate(clock, Tier::Retained) {
            return Ok(skip);
        }
        if !arena.checkpoint.is_valid() {
            info!("Checkpoint(Retained): no saved state");
            return Ok(Transfer::Skipped(SkipReason::NothingSaved));
        }
        if !engine.set_state(&arena.checkpoint.state) {
            warn!("Checkpoint(Retained): engine rejected state (status {})", engine.status());
            return Err(CheckpointError::EngineRejected);
        }
        info!("Checkpoint(Retained): state restored");
        Ok(Transfer::Done)
    }

    pub fn save_to_retained<E: FusionEngine>(
        &self,
        clock: &impl ClockPort,
        arena: &mut CheckpointArena,
        engine: &mut E,
    ) -> Result<Transfer, CheckpointError> {
        if let Some(skip) = self.gate(clock, Tier::Retained) {
            return Ok(skip);
        }
        let mut blob = StateBlob::zeroed();
        if !engine.get_state(&mut blob) {
            warn!("Checkpoint(Retained): engine refused export (status {})", engine.status());
            return Err(CheckpointError::EngineRejected);
        }
        arena.checkpoint.state = blob;
        arena.checkpoint.magic = RETAINED_MAGIC;
        info!("Checkpoint(Retained): state saved");
        Ok(Transfer::Done)
    }

    // ── Durable tier ──────────────────────────────────────────

    pub fn load_from_durable<E: FusionEngine>(
        &self,
        clock: &impl ClockPort,
        storage: &impl StoragePort,
        engine: &mut E,
    ) -> Result<Transfer, CheckpointError> {
        if let Some(skip) = self.gate(clock, Tier::Durable) {
            return Ok(skip);
        }

        let mut blob = StateBlob::zeroed();
        match storage.read(self.namespace, self.key, blob.as_bytes_mut()) {
            Ok(STATE_BLOB_LEN) => {}
            Ok(len) => {
                warn!("Checkpoint(Durable): stored blob is {} bytes, expected {}", len, STATE_BLOB_LEN);
                return Err(StorageError::SizeMismatch.into());
            }
            Err(StorageError::NotFound) => {
                info!("Checkpoint(Durable): no saved state");
                return Ok(Transfer::Skipped(SkipReason::NothingSaved));
            }
            Err(e) => {
                warn!("Checkpoint(Durable): read failed: {}", e);
                return Err(e.into());
            }
        }

        if !engine.set_state(&blob) {
            warn!("Checkpoint(Durable): engine rejected state (status {})", engine.status());
            return Err(CheckpointError::EngineRejected);
        }
        info!("Checkpoint(Durable): state restored");
        Ok(Transfer::Done)
    }

    pub fn save_to_durable<E: FusionEngine>(
        &self,
        clock: &impl ClockPort,
        storage: &mut impl StoragePort,
        engine: &mut E,
    ) -> Result<Transfer, CheckpointError> {
        if let Some(skip) = self.gate(clock, Tier::Durable) {
            return Ok(skip);
        }
        let mut blob = StateBlob::zeroed();
        if !engine.get_state(&mut blob) {
            warn!("Checkpoint(Durable): engine refused export (status {})", engine.status());
            return Err(CheckpointError::EngineRejected);
        }
        storage.write(self.namespace, self.key, blob.as_bytes()).map_err(|e| {
            warn!("Checkpoint(Durable): write failed: {}", e);
            CheckpointError::from(e)
        })?;
        info!("Checkpoint(Durable): state saved");
        Ok(Transfer::Done)
    }
}
