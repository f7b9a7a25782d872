//! Layout of the memory region that survives power-off.
//!
//! The arena lives in an uninitialised retained section, so every field
//! must be meaningful for any bit pattern: the checkpoint half is gated
//! by a magic word and the schedule half is reset on cold boot.

use crate::fusion::StateBlob;

/// Marks a retained checkpoint as written by this firmware.
pub const RETAINED_MAGIC: u32 = 0x5EC5_7A7E;

/// Engine state parked across power-off.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetainedCheckpoint {
    pub magic: u32,
    pub state: StateBlob,
}

impl RetainedCheckpoint {
    pub fn is_valid(&self) -> bool {
        self.magic == RETAINED_MAGIC
    }

    pub fn invalidate(&mut self) {
        self.magic = 0;
    }
}

/// Sampling schedule carried across power-off.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleState {
    /// Engine-clock time of the next sample. `<= 0` means no reference.
    pub next_call_ns: i64,
    /// Power-off cycles since the last durable checkpoint.
    pub cycle_counter: i8,
}

impl ScheduleState {
    pub const fn reset() -> Self {
        Self {
            next_call_ns: 0,
            cycle_counter: 0,
        }
    }

    pub fn has_reference(&self) -> bool {
        self.next_call_ns > 0
    }

    /// Cycle count with garbage (negative) values read as zero.
    pub fn cycles(&self) -> u8 {
        self.cycle_counter.max(0) as u8
    }

    /// Count one power-off cycle, saturating.
    pub fn count_cycle(&mut self) -> u8 {
        self.cycle_counter = self.cycle_counter.max(0).saturating_add(1);
        self.cycles()
    }

    pub fn clear_cycles(&mut self) {
        self.cycle_counter = 0;
    }
}

#[repr(C)]
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointArena {
    pub checkpoint: RetainedCheckpoint,
    pub schedule: ScheduleState,
}

impl CheckpointArena {
    pub const fn zeroed() -> Self {
        Self {
            checkpoint: RetainedCheckpoint {
                magic: 0,
                state: StateBlob::zeroed(),
            },
            schedule: ScheduleState::reset(),
        }
    }
}

impl Default for CheckpointArena {
    fn default() -> Self {
        Self::zeroed()
    }
}
