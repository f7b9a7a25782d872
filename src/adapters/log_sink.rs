//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART / USB-CDC in production).  A display or radio
//! adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::{AppEvent, Direction};
use crate::app::ports::EventSink;
use crate::checkpoint::Transfer;
use crate::fusion::MergedReading;
use crate::power::SleepTier;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

fn log_reading(r: &MergedReading) {
    if r.valid {
        info!(
            "READ  | Bat: {:.2}V | Tmp: {:.1} C | Hum: {:.1} % | IAQ: {:.1} ({})",
            f32::from(r.battery_mv) / 1000.0,
            r.temperature,
            r.humidity,
            r.iaq,
            r.iaq_accuracy,
        );
    } else {
        warn!("READ  | no sample | Bat: {}mV", r.battery_mv);
    }

    if r.is_fused {
        info!(
            "FUSED | iaq={:.1} acc={} | T={:.2}\u{00b0}C RH={:.2}% | P={:.1}hPa | \
             gas={:.0}\u{03a9} | stab={} run_in={}",
            r.iaq,
            r.iaq_accuracy,
            r.temperature,
            r.humidity,
            r.pressure,
            r.gas_resistance,
            r.stabilization_status,
            r.run_in_status,
        );
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Woke(cause) => {
                info!("WAKE  | cause={:?}", cause);
            }
            AppEvent::Status(msg) => {
                info!("STAT  | {}", msg);
            }
            AppEvent::Reading(r) => log_reading(r),
            AppEvent::Checkpoint {
                tier,
                direction,
                outcome,
            } => {
                let verb = match direction {
                    Direction::Load => "load",
                    Direction::Save => "save",
                };
                match outcome {
                    Ok(Transfer::Done) => info!("CKPT  | {:?} {} ok", tier, verb),
                    Ok(Transfer::Skipped(why)) => {
                        info!("CKPT  | {:?} {} skipped ({:?})", tier, verb, why)
                    }
                    Err(e) => warn!("CKPT  | {:?} {} failed: {}", tier, verb, e),
                }
            }
            AppEvent::Sleeping { tier, sleep_us } => match tier {
                SleepTier::Skip => {
                    warn!("SLEEP | behind schedule by {}us, running now", -sleep_us)
                }
                SleepTier::BusyWait(us) => info!("SLEEP | busy-wait {}us", us),
                SleepTier::LightSleep(us) => info!("SLEEP | light sleep {}ms", us / 1000),
                SleepTier::PowerOff(us) => info!("SLEEP | deep sleep {}s", us / 1_000_000),
            },
        }
    }
}
