//! Wake classification, sleep-tier selection and schedule drift.
//!
//! Pure decision functions; the board adapter executes them.
//!
//! ```text
//!  sleep_us:   < 0      < short_wait     < light_sleep       >= light_sleep
//!              Skip     BusyWait         LightSleep          PowerOff
//!              (error)  (spin, ms)       (RAM kept, ~mA)     (RTC only, ~µA)
//! ```

use crate::config::NodeConfig;

/// Why the SoC is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    /// Power-on or reset; retained memory is garbage.
    ColdBoot,
    /// The wake timer armed before power-off fired.
    Timer,
    /// A GPIO or other external source.
    External,
    /// Anything the board cannot classify.
    Other,
}

/// How to spend the interval until the next sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepTier {
    /// Negative interval; the schedule is behind, run again immediately.
    Skip,
    BusyWait(u64),
    LightSleep(u64),
    PowerOff(u64),
}

impl SleepTier {
    pub fn is_power_off(self) -> bool {
        matches!(self, Self::PowerOff(_))
    }
}

/// Handed to the binary once the scheduler wants full power-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerOff {
    /// Wake-timer duration.
    pub sleep_us: u64,
}

// ═══════════════════════════════════════════════════════════════
//  Tier selection
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierThresholds {
    pub short_wait_us: u64,
    /// Waits at or above this go to power-off.
    pub light_sleep_us: u64,
}

impl TierThresholds {
    pub fn from_config(cfg: &NodeConfig) -> Self {
        Self {
            short_wait_us: cfg.short_wait_threshold_us,
            light_sleep_us: cfg.light_sleep_threshold_us,
        }
    }
}

pub fn select_tier(sleep_us: i64, thresholds: &TierThresholds) -> SleepTier {
    let Ok(us) = u64::try_from(sleep_us) else {
        return SleepTier::Skip;
    };
    if us < thresholds.short_wait_us {
        SleepTier::BusyWait(us)
    } else if us < thresholds.light_sleep_us {
        SleepTier::LightSleep(us)
    } else {
        SleepTier::PowerOff(us)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Drift
// ═══════════════════════════════════════════════════════════════

/// How far the wake landed from the scheduled sample time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    /// No previous schedule (first sample after cold boot).
    NoReference,
    /// Within tolerance; carries the signed offset in µs.
    OnTime(i64),
    /// Early by this many µs, small enough to spin away.
    EarlyCorrectable(u64),
    /// Early by more than the correction window (µs).
    Early(u64),
    /// Late by more than the warning threshold (µs).
    Late(u64),
}

pub fn assess_drift(now_ns: i64, next_call_ns: i64, early_window_us: u64, late_warning_us: u64) -> Drift {
    if next_call_ns <= 0 {
        return Drift::NoReference;
    }
    let diff_us = now_ns.saturating_sub(next_call_ns) / 1000;
    if diff_us < 0 {
        let early = diff_us.unsigned_abs();
        if early <= early_window_us {
            Drift::EarlyCorrectable(early)
        } else {
            Drift::Early(early)
        }
    } else if diff_us.unsigned_abs() > late_warning_us {
        Drift::Late(diff_us.unsigned_abs())
    } else {
        Drift::OnTime(diff_us)
    }
}
