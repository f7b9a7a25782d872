//! Wake/sleep scheduler.
//!
//! Owns the sampling loop of the node: classify the wake, bring the
//! sensor path up, take samples when the fusion engine says they are
//! due, and pick the cheapest way to wait for the next one.
//!
//! ```text
//!        ┌──────────────┐  ColdBoot/External/Other  ┌────────────────────────┐
//!  boot ─┤ classify     ├──────────────────────────▶│ cold bring-up          │
//!        │ wake_cause() │                           │ reset schedule         │
//!        └──────┬───────┘                           │ sync clock if needed   │
//!               │ Timer                             │ bus → session ← NVS    │
//!               ▼                                   │ battery                │
//!        ┌────────────────────────┐                 └───────────┬────────────┘
//!        │ timer bring-up         │                             │
//!        │ sync clock if needed   │                             │
//!        │ bus → session ← RTC    │                             │
//!        │        (NVS fallback)  │                             │
//!        │ battery                │                             │
//!        └───────────┬────────────┘                             │
//!                    ▼                                          ▼
//!        ┌───────────────────────────────────────────────────────────────┐
//!        │ step(): drift → run_once → Reading event → next due → tier    │
//!        │   BusyWait / LightSleep ──▶ loop                              │
//!        │   PowerOff ──▶ checkpoint (RTC always, NVS every N / low bat) │
//!        └───────────────────────────────┬───────────────────────────────┘
//!                                        ▼
//!                              PowerOff { sleep_us } → deep sleep (binary)
//! ```
//!
//! Bring-up failures never stop the loop: the node keeps running with
//! whatever came up, reports the faults, and retries a full bring-up
//! after a degraded-interval power-off.

use log::{debug, error, info, warn};

use crate::app::events::{AppEvent, Direction};
use crate::app::ports::{BoardPort, ClockPort, EventSink, FusionEngine, StoragePort, TimeSyncError, TimeSyncPort};
use crate::checkpoint::{CheckpointArena, CheckpointStore, ScheduleState, Tier, Transfer};
use crate::config::NodeConfig;
use crate::error::{CheckpointError, Error, SessionError};
use crate::fusion::{BusHandle, FusionSession, MergedReading};
use crate::power::{Drift, PowerOff, SleepTier, TierThresholds, WakeCause, assess_drift, select_tier};

/// Upper bound on distinct bring-up faults (clock, bus, session, battery).
pub const MAX_WAKE_FAULTS: usize = 4;

// ═══════════════════════════════════════════════════════════════
//  Context
// ═══════════════════════════════════════════════════════════════

/// State shared by every stage of a wake: the latest reading and the
/// retained arena.
pub struct NodeContext<'a> {
    pub reading: MergedReading,
    pub arena: &'a mut CheckpointArena,
}

/// What `wake` found and what failed during bring-up.
#[derive(Debug, Clone)]
pub struct WakeReport {
    pub cause: WakeCause,
    pub faults: heapless::Vec<Error, MAX_WAKE_FAULTS>,
}

impl WakeReport {
    pub fn is_degraded(&self) -> bool {
        !self.faults.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler
// ═══════════════════════════════════════════════════════════════

pub struct Scheduler<'a, E: FusionEngine> {
    config: NodeConfig,
    thresholds: TierThresholds,
    store: CheckpointStore,
    session: FusionSession<E>,
    ctx: NodeContext<'a>,
    bus: Option<BusHandle>,
    /// Consecutive iterations that found the next sample already overdue.
    overdue_streak: u32,
}

impl<'a, E: FusionEngine> Scheduler<'a, E> {
    pub fn new(config: NodeConfig, session: FusionSession<E>, arena: &'a mut CheckpointArena) -> Self {
        Self {
            thresholds: TierThresholds::from_config(&config),
            store: CheckpointStore::new(config.clock_valid_after_year),
            config,
            session,
            ctx: NodeContext {
                reading: MergedReading::default(),
                arena,
            },
            bus: None,
            overdue_streak: 0,
        }
    }

    // ── Wake ──────────────────────────────────────────────────

    /// Classify the wake and bring the sensor path up.
    pub fn wake(
        &mut self,
        board: &mut impl BoardPort,
        net: &mut impl TimeSyncPort,
        storage: &impl StoragePort,
        sink: &mut impl EventSink,
    ) -> WakeReport {
        let cause = board.wake_cause();
        sink.emit(&AppEvent::Woke(cause));
        let mut report = WakeReport {
            cause,
            faults: heapless::Vec::new(),
        };

        let timer_wake = cause == WakeCause::Timer;
        if timer_wake {
            info!(
                "Wake: timer (next sample at {} ns, {} cycle(s) since durable save)",
                self.ctx.arena.schedule.next_call_ns,
                self.ctx.arena.schedule.cycles()
            );
        } else {
            info!("Wake: {:?}, full bring-up", cause);
            self.ctx.arena.schedule = ScheduleState::reset();
            self.ctx.arena.checkpoint.invalidate();
            self.ctx.reading = MergedReading::default();
        }

        sink.emit(&AppEvent::Status("Checking Time..."));
        if let Err(e) = self.ensure_clock(&*board, net) {
            sink.emit(&AppEvent::Status("Time Sync Fail!"));
            record(&mut report, e.into());
        }

        sink.emit(&AppEvent::Status("Init Sensor..."));
        if self.bus.is_none() {
            self.bus = board.bring_up_bus();
        }
        if self.bus.is_none() {
            record(&mut report, Error::Init("sensor bus"));
        }

        let store = &self.store;
        let arena: &CheckpointArena = self.ctx.arena;
        let clock = &*board;
        let result = self.session.initialize(self.bus, |engine| {
            restore(store, clock, arena, storage, engine, timer_wake, sink);
        });
        if let Err(e) = result {
            record(&mut report, e.into());
        }

        match board.read_battery_mv() {
            Ok(mv) => {
                info!("Battery: {} mV", mv);
                self.ctx.reading.battery_mv = mv;
            }
            Err(e) => record(&mut report, e.into()),
        }

        if report.is_degraded() {
            warn!("Wake: {} bring-up fault(s), running degraded", report.faults.len());
        }
        report
    }

    /// Sync the wall clock from the network unless the RTC already holds
    /// a plausible date.
    fn ensure_clock(&self, clock: &impl ClockPort, net: &mut impl TimeSyncPort) -> Result<(), TimeSyncError> {
        if self.store.is_clock_valid(clock) {
            info!("Time: RTC valid (year {}), skipping network sync", clock.calendar_year());
            return Ok(());
        }
        info!("Time: RTC not set (year {}), syncing", clock.calendar_year());
        net.sync_time()?;
        if !self.store.is_clock_valid(clock) {
            warn!("Time: sync finished but clock reads year {}", clock.calendar_year());
            return Err(TimeSyncError::SntpTimeout);
        }
        info!("Time: synchronised");
        Ok(())
    }

    // ── Sampling loop ─────────────────────────────────────────

    /// One iteration of the sampling loop.
    ///
    /// Busy-wait and light-sleep tiers are carried out before returning;
    /// a power-off tier has already been checkpointed and is left to the
    /// caller.
    pub fn step(
        &mut self,
        board: &mut impl BoardPort,
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) -> SleepTier {
        self.ctx.reading.begin_cycle();

        let drift = assess_drift(
            board.now_ns(),
            self.ctx.arena.schedule.next_call_ns,
            self.config.early_wake_window_us,
            self.config.late_warning_us,
        );
        match drift {
            Drift::NoReference => info!("Drift: no reference, first sample"),
            Drift::OnTime(us) => debug!("Drift: {} us", us),
            Drift::EarlyCorrectable(us) => {
                debug!("Drift: {} us early, waiting", us);
                board.busy_wait_us(us);
            }
            Drift::Early(us) => info!("Drift: woke {} us early, sampling anyway", us),
            Drift::Late(us) => warn!("Drift: timing error, {} us late", us),
        }

        match self.session.run_once(&mut self.ctx.reading) {
            Ok(()) => {}
            Err(SessionError::NotInitialized) => debug!("Sample: session not running"),
            Err(e) => error!("Sample: {}", e),
        }
        sink.emit(&AppEvent::Reading(self.ctx.reading));

        let now = board.now_ns();
        let next_due = if self.session.is_ready() {
            self.session.next_due_time_ns()
        } else {
            now.saturating_add(i64::from(self.config.degraded_interval_secs) * 1_000_000_000)
        };
        self.ctx.arena.schedule.next_call_ns = next_due;

        let sleep_us = next_due.saturating_sub(now) / 1000;
        let tier = select_tier(sleep_us, &self.thresholds);
        sink.emit(&AppEvent::Sleeping { tier, sleep_us });

        if tier == SleepTier::Skip {
            self.overdue_streak = self.overdue_streak.saturating_add(1);
        } else {
            self.overdue_streak = 0;
        }
        match tier {
            SleepTier::Skip => error!(
                "Sleep: next sample overdue by {} us ({} in a row)",
                sleep_us.unsigned_abs(),
                self.overdue_streak
            ),
            SleepTier::BusyWait(us) => board.busy_wait_us(us),
            SleepTier::LightSleep(us) => {
                info!("Sleep: light sleep {} ms", us / 1000);
                board.light_sleep_us(us);
            }
            SleepTier::PowerOff(us) => {
                info!("Sleep: power-off {} s", us / 1_000_000);
                self.checkpoint_for_power_off(&*board, storage, sink);
            }
        }
        tier
    }

    /// Wake, then loop until the schedule calls for power-off.
    pub fn run(
        &mut self,
        board: &mut impl BoardPort,
        net: &mut impl TimeSyncPort,
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) -> PowerOff {
        self.wake(board, net, &*storage, sink);
        loop {
            if let SleepTier::PowerOff(sleep_us) = self.step(board, storage, sink) {
                return PowerOff { sleep_us };
            }
        }
    }

    // ── Checkpointing ─────────────────────────────────────────

    fn checkpoint_for_power_off(
        &mut self,
        clock: &impl ClockPort,
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) {
        if !self.session.is_ready() {
            debug!("Checkpoint: session not running, nothing to save");
            return;
        }

        let cycles = self.ctx.arena.schedule.count_cycle();
        let outcome = self
            .store
            .save_to_retained(clock, self.ctx.arena, self.session.engine_mut());
        emit_transfer(sink, Tier::Retained, Direction::Save, outcome);

        let battery_mv = self.ctx.reading.battery_mv;
        let low_battery = battery_mv != 0 && battery_mv < self.config.low_battery_mv;
        if cycles >= self.config.durable_save_every || low_battery {
            if low_battery {
                warn!("Battery low ({} mV), writing durable checkpoint", battery_mv);
            }
            self.save_durable(clock, storage, sink);
        }
    }

    fn save_durable(&mut self, clock: &impl ClockPort, storage: &mut impl StoragePort, sink: &mut impl EventSink) {
        let outcome = self.store.save_to_durable(clock, storage, self.session.engine_mut());
        if outcome == Ok(Transfer::Done) {
            self.ctx.arena.schedule.clear_cycles();
        }
        emit_transfer(sink, Tier::Durable, Direction::Save, outcome);
    }

    /// Imminent loss of power: write both tiers now, regardless of cadence.
    ///
    /// For board integrations with a supply-sense signal, called from task
    /// context once it fires. The stock binary has no such signal and
    /// relies on the low-battery durable save in [`Self::step`].
    pub fn on_power_removal(
        &mut self,
        clock: &impl ClockPort,
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) {
        if !self.session.is_ready() {
            warn!("Checkpoint: power removal with session down, nothing to save");
            return;
        }
        info!("Checkpoint: power removal, saving both tiers");
        let outcome = self
            .store
            .save_to_retained(clock, self.ctx.arena, self.session.engine_mut());
        emit_transfer(sink, Tier::Retained, Direction::Save, outcome);
        self.save_durable(clock, storage, sink);
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn reading(&self) -> &MergedReading {
        &self.ctx.reading
    }

    pub fn schedule(&self) -> &ScheduleState {
        &self.ctx.arena.schedule
    }

    pub fn session(&self) -> &FusionSession<E> {
        &self.session
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn overdue_streak(&self) -> u32 {
        self.overdue_streak
    }
}

// ═══════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════

fn record(report: &mut WakeReport, fault: Error) {
    error!("Wake: {}", fault);
    if report.faults.push(fault).is_err() {
        warn!("Wake: fault list full, dropping {}", fault);
    }
}

fn emit_transfer(
    sink: &mut impl EventSink,
    tier: Tier,
    direction: Direction,
    outcome: Result<Transfer, CheckpointError>,
) {
    sink.emit(&AppEvent::Checkpoint {
        tier,
        direction,
        outcome,
    });
}

/// Restore engine state during session bring-up.
///
/// Timer wakes try the retained tier first; anything short of a
/// successful import there falls back to the durable tier.
fn restore<E: FusionEngine>(
    store: &CheckpointStore,
    clock: &impl ClockPort,
    arena: &CheckpointArena,
    storage: &impl StoragePort,
    engine: &mut E,
    prefer_retained: bool,
    sink: &mut impl EventSink,
) {
    if prefer_retained {
        let outcome = store.load_from_retained(clock, arena, engine);
        emit_transfer(sink, Tier::Retained, Direction::Load, outcome);
        if outcome == Ok(Transfer::Done) {
            return;
        }
    }
    let outcome = store.load_from_durable(clock, storage, engine);
    emit_transfer(sink, Tier::Durable, Direction::Load, outcome);
}
