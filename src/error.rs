//! Unified error types for the airnode firmware.
//!
//! Every subsystem error converts into the top-level [`Error`], so wake
//! bring-up can collect failures of different origin in one list. All
//! variants are `Copy` so they can be stored in fixed-capacity reports
//! without allocation.

use core::fmt;

use crate::app::ports::{BatteryError, StorageError, TimeSyncError};

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The fusion session could not be brought up or iterated.
    Session(SessionError),
    /// Moving engine state into or out of a checkpoint tier failed.
    Checkpoint(CheckpointError),
    /// Network time synchronisation failed.
    TimeSync(TimeSyncError),
    /// Battery voltage could not be sampled.
    Battery(BatteryError),
    /// Peripheral initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(e) => write!(f, "session: {e}"),
            Self::Checkpoint(e) => write!(f, "checkpoint: {e}"),
            Self::TimeSync(e) => write!(f, "time sync: {e}"),
            Self::Battery(e) => write!(f, "battery: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Fusion session errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// No bus handle, or the engine refused to start on it.
    Init,
    /// The engine rejected the static configuration blob.
    Config,
    /// The engine rejected the output subscription.
    Subscription,
    /// An iteration failed; carries the engine status code.
    Run(i32),
    /// `run_once` was called before a successful `initialize`.
    NotInitialized,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "engine init failed"),
            Self::Config => write!(f, "engine rejected config"),
            Self::Subscription => write!(f, "engine rejected subscription"),
            Self::Run(status) => write!(f, "engine run failed (status {status})"),
            Self::NotInitialized => write!(f, "session not initialized"),
        }
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

// ---------------------------------------------------------------------------
// Checkpoint errors
// ---------------------------------------------------------------------------

/// A checkpoint transfer that was attempted and failed.
///
/// Transfers skipped because the clock is untrusted or nothing was saved
/// are not errors; see [`Transfer`](crate::checkpoint::Transfer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointError {
    /// The durable store failed, or held a blob of the wrong size.
    Storage(StorageError),
    /// The engine refused to export or import its state.
    EngineRejected,
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::EngineRejected => write!(f, "engine rejected state"),
        }
    }
}

impl From<StorageError> for CheckpointError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<CheckpointError> for Error {
    fn from(e: CheckpointError) -> Self {
        Self::Checkpoint(e)
    }
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

impl From<TimeSyncError> for Error {
    fn from(e: TimeSyncError) -> Self {
        Self::TimeSync(e)
    }
}

impl From<BatteryError> for Error {
    fn from(e: BatteryError) -> Self {
        Self::Battery(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
