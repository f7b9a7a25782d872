//! RTC retained memory.
//!
//! The [`CheckpointArena`] lives in the RTC no-init section, which stays
//! powered through deep sleep and is left untouched by the startup code.
//! After power-on its contents are garbage, which the arena layout
//! tolerates: the scheduler resets the schedule half on cold boot and the
//! checkpoint half is only trusted behind its magic word.
//!
//! On the host the arena is an ordinary static.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::checkpoint::CheckpointArena;

struct RetainedCell(UnsafeCell<CheckpointArena>);

// SAFETY: the only access path is `take`, which hands out at most one
// reference for the lifetime of the program.
unsafe impl Sync for RetainedCell {}

#[cfg_attr(target_os = "espidf", unsafe(link_section = ".rtc_noinit"))]
static ARENA: RetainedCell = RetainedCell(UnsafeCell::new(CheckpointArena::zeroed()));

static TAKEN: AtomicBool = AtomicBool::new(false);

/// Claim the retained arena. Returns `None` on every call after the first.
pub fn take() -> Option<&'static mut CheckpointArena> {
    if TAKEN.swap(true, Ordering::AcqRel) {
        return None;
    }
    // SAFETY: the swap above guarantees this is the only live reference.
    Some(unsafe { &mut *ARENA.0.get() })
}
