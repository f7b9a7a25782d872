//! Outbound application events.
//!
//! The [`Scheduler`](crate::scheduler::Scheduler) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, draw on the display,
//! publish over a radio, etc.

use crate::checkpoint::{Tier, Transfer};
use crate::error::CheckpointError;
use crate::fusion::MergedReading;
use crate::power::{SleepTier, WakeCause};

/// Whether a checkpoint transfer moved state into or out of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Load,
    Save,
}

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The device woke and was classified.
    Woke(WakeCause),

    /// Short human-readable progress line ("Checking Time...").
    Status(&'static str),

    /// One sampling iteration finished; carries the merged reading.
    Reading(MergedReading),

    /// A checkpoint transfer was attempted.
    Checkpoint {
        tier: Tier,
        direction: Direction,
        outcome: Result<Transfer, CheckpointError>,
    },

    /// The scheduler picked how to wait for the next sample.
    Sleeping { tier: SleepTier, sleep_us: i64 },
}
