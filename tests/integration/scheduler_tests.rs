//! Scheduler wake/sleep behaviour against mock adapters.

use airnode::app::events::{AppEvent, Direction};
use airnode::checkpoint::{CheckpointArena, RETAINED_MAGIC, SkipReason, Tier, Transfer};
use airnode::config::NodeConfig;
use airnode::error::{Error, SessionError};
use airnode::fusion::{FusedOutput, FusionSession, OutputId, SampleRate, StateBlob, STATE_BLOB_LEN};
use airnode::power::{SleepTier, WakeCause};
use airnode::scheduler::Scheduler;

use crate::mock_hw::{MockBoard, MockEngine, MockNet, MockNvs, RecordingSink, SimClock};

const CFG: &[u8] = b"engine-config";
const EIGHT_SECONDS_NS: i64 = 8_000_000_000;
const ULP_NS: i64 = 300_000_000_000;

fn scheduler(engine: MockEngine, arena: &mut CheckpointArena) -> Scheduler<'_, MockEngine> {
    Scheduler::new(
        NodeConfig::default(),
        FusionSession::new(engine, CFG, SampleRate::Ulp),
        arena,
    )
}

fn fused_outputs() -> Vec<FusedOutput> {
    vec![
        FusedOutput::new(OutputId::Iaq, 42.0, 1),
        FusedOutput::new(OutputId::RawTemperature, 24.0, 3),
        FusedOutput::new(OutputId::HeatCompensatedTemperature, 22.5, 3),
        FusedOutput::new(OutputId::HeatCompensatedHumidity, 48.0, 3),
    ]
}

// ── Cold boot ─────────────────────────────────────────────────

#[test]
fn cold_boot_syncs_then_light_sleeps_without_bus_reinit() {
    let clock = SimClock::new(false);
    let mut board = MockBoard::new(&clock, WakeCause::ColdBoot);
    let mut net = MockNet::new(&clock, true);
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::new();
    let mut arena = CheckpointArena::zeroed();

    let mut sched = scheduler(MockEngine::new(&clock, EIGHT_SECONDS_NS), &mut arena);
    let report = sched.wake(&mut board, &mut net, &nvs, &mut sink);
    assert!(!report.is_degraded(), "faults: {:?}", report.faults);
    assert_eq!(net.calls, 1);
    assert_eq!(sink.statuses(), vec!["Checking Time...", "Init Sensor..."]);

    let tier = sched.step(&mut board, &mut nvs, &mut sink);
    assert_eq!(tier, SleepTier::LightSleep(8_000_000));
    assert!(sched.reading().valid);
    assert!(!sched.reading().is_fused);
    assert_eq!(sched.reading().iaq, 0.0);
    assert_eq!(board.light_sleeps, vec![8_000_000]);

    let tier = sched.step(&mut board, &mut nvs, &mut sink);
    assert_eq!(tier, SleepTier::LightSleep(8_000_000));
    assert_eq!(sched.session().engine().samples, 2);
    assert_eq!(sched.session().engine().init_calls, 1);
    assert_eq!(board.bus_calls, 1);
}

#[test]
fn valid_rtc_skips_network() {
    let clock = SimClock::new(true);
    let mut board = MockBoard::new(&clock, WakeCause::ColdBoot);
    let mut net = MockNet::new(&clock, true);
    let nvs = MockNvs::new();
    let mut sink = RecordingSink::new();
    let mut arena = CheckpointArena::zeroed();

    let mut sched = scheduler(MockEngine::new(&clock, ULP_NS), &mut arena);
    let report = sched.wake(&mut board, &mut net, &nvs, &mut sink);
    assert!(!report.is_degraded());
    assert_eq!(net.calls, 0);
}

#[test]
fn cold_boot_discards_retained_state_and_schedule() {
    let clock = SimClock::new(true);
    let mut board = MockBoard::new(&clock, WakeCause::ColdBoot);
    let mut net = MockNet::new(&clock, true);
    let mut nvs = MockNvs::new();
    nvs.put_durable(&[0x11; STATE_BLOB_LEN]);
    let mut sink = RecordingSink::new();

    let mut arena = CheckpointArena::zeroed();
    arena.checkpoint.magic = RETAINED_MAGIC;
    arena.checkpoint.state = StateBlob([0x22; STATE_BLOB_LEN]);
    arena.schedule.next_call_ns = 123;
    arena.schedule.cycle_counter = 5;

    {
        let mut sched = scheduler(MockEngine::new(&clock, ULP_NS), &mut arena);
        sched.wake(&mut board, &mut net, &nvs, &mut sink);
        assert_eq!(
            sched.session().engine().imported,
            Some(StateBlob([0x11; STATE_BLOB_LEN])),
            "cold boot restores from flash"
        );
        assert_eq!(sched.schedule().next_call_ns, 0);
        assert_eq!(sched.schedule().cycles(), 0);
    }
    assert!(!arena.checkpoint.is_valid());
}

#[test]
fn unclassified_wakes_take_the_cold_path() {
    for cause in [WakeCause::External, WakeCause::Other] {
        let clock = SimClock::new(true);
        let mut board = MockBoard::new(&clock, cause);
        let mut net = MockNet::new(&clock, true);
        let mut nvs = MockNvs::new();
        nvs.put_durable(&[0x11; STATE_BLOB_LEN]);
        let mut sink = RecordingSink::new();

        let mut arena = CheckpointArena::zeroed();
        arena.checkpoint.magic = RETAINED_MAGIC;
        arena.checkpoint.state = StateBlob([0x22; STATE_BLOB_LEN]);
        arena.schedule.next_call_ns = 123;
        arena.schedule.cycle_counter = 5;

        {
            let mut sched = scheduler(MockEngine::new(&clock, ULP_NS), &mut arena);
            let report = sched.wake(&mut board, &mut net, &nvs, &mut sink);
            assert_eq!(report.cause, cause);
            assert_eq!(
                sched.session().engine().imported,
                Some(StateBlob([0x11; STATE_BLOB_LEN])),
                "{cause:?} restores from flash"
            );
            assert_eq!(sched.schedule().next_call_ns, 0);
            assert_eq!(sched.schedule().cycles(), 0);
        }
        assert!(!arena.checkpoint.is_valid(), "{cause:?} left retained state valid");

        let loads: Vec<_> = sink
            .events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Checkpoint {
                    tier,
                    direction: Direction::Load,
                    outcome,
                } => Some((*tier, *outcome)),
                _ => None,
            })
            .collect();
        assert_eq!(loads, vec![(Tier::Durable, Ok(Transfer::Done))], "{cause:?}");
    }
}

// ── Timer wake restore order ──────────────────────────────────

#[test]
fn timer_wake_prefers_retained_checkpoint() {
    let clock = SimClock::new(true);
    let mut board = MockBoard::new(&clock, WakeCause::Timer);
    let mut net = MockNet::new(&clock, true);
    let mut nvs = MockNvs::new();
    nvs.put_durable(&[0x11; STATE_BLOB_LEN]);
    let mut sink = RecordingSink::new();

    let mut arena = CheckpointArena::zeroed();
    arena.checkpoint.magic = RETAINED_MAGIC;
    arena.checkpoint.state = StateBlob([0x22; STATE_BLOB_LEN]);

    let mut sched = scheduler(MockEngine::new(&clock, ULP_NS), &mut arena);
    sched.wake(&mut board, &mut net, &nvs, &mut sink);

    assert_eq!(
        sched.session().engine().imported,
        Some(StateBlob([0x22; STATE_BLOB_LEN]))
    );
    assert_eq!(nvs.reads.get(), 0, "flash not consulted when RTC copy is good");
}

#[test]
fn timer_wake_falls_back_to_durable() {
    let clock = SimClock::new(true);
    let mut board = MockBoard::new(&clock, WakeCause::Timer);
    let mut net = MockNet::new(&clock, true);
    let mut nvs = MockNvs::new();
    nvs.put_durable(&[0x11; STATE_BLOB_LEN]);
    let mut sink = RecordingSink::new();
    let mut arena = CheckpointArena::zeroed();

    let mut sched = scheduler(MockEngine::new(&clock, ULP_NS), &mut arena);
    sched.wake(&mut board, &mut net, &nvs, &mut sink);

    assert_eq!(
        sched.session().engine().imported,
        Some(StateBlob([0x11; STATE_BLOB_LEN]))
    );
    let loads: Vec<_> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::Checkpoint {
                tier,
                direction: Direction::Load,
                outcome,
            } => Some((*tier, *outcome)),
            _ => None,
        })
        .collect();
    assert_eq!(
        loads,
        vec![
            (Tier::Retained, Ok(Transfer::Skipped(SkipReason::NothingSaved))),
            (Tier::Durable, Ok(Transfer::Done)),
        ]
    );
}

// ── Degraded bring-up ─────────────────────────────────────────

#[test]
fn missing_bus_degrades_to_long_power_off() {
    let clock = SimClock::new(true);
    let mut board = MockBoard::new(&clock, WakeCause::ColdBoot);
    board.bus_ok = false;
    let mut net = MockNet::new(&clock, true);
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::new();
    let mut arena = CheckpointArena::zeroed();

    let mut sched = scheduler(MockEngine::new(&clock, ULP_NS), &mut arena);
    let report = sched.wake(&mut board, &mut net, &nvs, &mut sink);
    assert!(report.faults.contains(&Error::Init("sensor bus")));
    assert!(report.faults.contains(&Error::Session(SessionError::Init)));

    let tier = sched.step(&mut board, &mut nvs, &mut sink);
    let degraded_us = u64::from(NodeConfig::default().degraded_interval_secs) * 1_000_000;
    assert_eq!(tier, SleepTier::PowerOff(degraded_us));
    assert!(!sched.reading().valid);
    assert_eq!(nvs.writes, 0, "nothing to checkpoint without a session");
}

#[test]
fn failed_time_sync_is_reported_and_loop_continues() {
    let clock = SimClock::new(false);
    let mut board = MockBoard::new(&clock, WakeCause::ColdBoot);
    let mut net = MockNet::new(&clock, false);
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::new();
    let mut arena = CheckpointArena::zeroed();

    let mut sched = scheduler(MockEngine::new(&clock, ULP_NS), &mut arena);
    let report = sched.wake(&mut board, &mut net, &nvs, &mut sink);
    assert!(report.is_degraded());
    assert!(sink.statuses().contains(&"Time Sync Fail!"));
    assert!(sched.session().is_ready());

    let tier = sched.step(&mut board, &mut nvs, &mut sink);
    assert!(tier.is_power_off());
    assert!(sched.reading().valid);
}

// ── Sampling loop ─────────────────────────────────────────────

#[test]
fn fused_reading_prefers_heat_compensated() {
    let clock = SimClock::new(true);
    let mut board = MockBoard::new(&clock, WakeCause::ColdBoot);
    let mut net = MockNet::new(&clock, true);
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::new();
    let mut arena = CheckpointArena::zeroed();

    let engine = MockEngine::new(&clock, ULP_NS).with_outputs(fused_outputs());
    let mut sched = scheduler(engine, &mut arena);
    sched.wake(&mut board, &mut net, &nvs, &mut sink);
    sched.step(&mut board, &mut nvs, &mut sink);

    let r = sched.reading();
    assert!(r.valid && r.is_fused);
    assert_eq!(r.temperature, 22.5);
    assert_eq!(r.humidity, 48.0);
    assert_eq!(r.iaq, 42.0);
    assert_eq!(r.iaq_accuracy, 1);
    assert_eq!(r.battery_mv, 3900);
}

#[test]
fn slightly_early_wake_is_corrected_by_busy_wait() {
    let clock = SimClock::new(true);
    let mut board = MockBoard::new(&clock, WakeCause::Timer);
    let mut net = MockNet::new(&clock, true);
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::new();
    let mut arena = CheckpointArena::zeroed();
    arena.schedule.next_call_ns = clock.now() + 40_000_000;

    let mut engine = MockEngine::new(&clock, ULP_NS);
    engine.next_call = arena.schedule.next_call_ns;
    let mut sched = scheduler(engine, &mut arena);
    sched.wake(&mut board, &mut net, &nvs, &mut sink);
    sched.step(&mut board, &mut nvs, &mut sink);

    assert_eq!(board.busy_waits.first(), Some(&40_000));
    assert_eq!(sched.session().engine().samples, 1);
}

#[test]
fn overdue_schedule_never_sleeps() {
    let clock = SimClock::new(true);
    let mut board = MockBoard::new(&clock, WakeCause::ColdBoot);
    let mut net = MockNet::new(&clock, true);
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::new();
    let mut arena = CheckpointArena::zeroed();

    let mut sched = scheduler(MockEngine::new(&clock, -1_000_000_000), &mut arena);
    sched.wake(&mut board, &mut net, &nvs, &mut sink);
    let tier = sched.step(&mut board, &mut nvs, &mut sink);

    assert_eq!(tier, SleepTier::Skip);
    assert!(board.busy_waits.is_empty());
    assert!(board.light_sleeps.is_empty());
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AppEvent::Sleeping { tier: SleepTier::Skip, sleep_us } if *sleep_us < 0
    )));
}

#[test]
fn overdue_streak_counts_consecutive_skips() {
    let clock = SimClock::new(true);
    let mut board = MockBoard::new(&clock, WakeCause::ColdBoot);
    let mut net = MockNet::new(&clock, true);
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::new();
    let mut arena = CheckpointArena::zeroed();

    let mut sched = scheduler(MockEngine::new(&clock, -1_000_000_000), &mut arena);
    sched.wake(&mut board, &mut net, &nvs, &mut sink);
    assert_eq!(sched.overdue_streak(), 0);
    for expected in 1..=3 {
        assert_eq!(sched.step(&mut board, &mut nvs, &mut sink), SleepTier::Skip);
        assert_eq!(sched.overdue_streak(), expected);
    }
}

#[test]
fn sleeping_clears_the_overdue_streak() {
    let clock = SimClock::new(true);
    let mut board = MockBoard::new(&clock, WakeCause::ColdBoot);
    let mut net = MockNet::new(&clock, true);
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::new();
    let mut arena = CheckpointArena::zeroed();

    let mut engine = MockEngine::new(&clock, EIGHT_SECONDS_NS);
    engine.stalled_runs = 2;
    engine.next_call = clock.now() - 1_000_000_000;
    let mut sched = scheduler(engine, &mut arena);
    sched.wake(&mut board, &mut net, &nvs, &mut sink);

    assert_eq!(sched.step(&mut board, &mut nvs, &mut sink), SleepTier::Skip);
    assert_eq!(sched.step(&mut board, &mut nvs, &mut sink), SleepTier::Skip);
    assert_eq!(sched.overdue_streak(), 2);

    assert_eq!(
        sched.step(&mut board, &mut nvs, &mut sink),
        SleepTier::LightSleep(8_000_000)
    );
    assert_eq!(sched.overdue_streak(), 0);
}

#[test]
fn run_error_does_not_stop_the_loop() {
    let clock = SimClock::new(true);
    let mut board = MockBoard::new(&clock, WakeCause::ColdBoot);
    let mut net = MockNet::new(&clock, true);
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::new();
    let mut arena = CheckpointArena::zeroed();

    let mut engine = MockEngine::new(&clock, EIGHT_SECONDS_NS);
    engine.fail_run = true;
    engine.next_call = clock.now() + EIGHT_SECONDS_NS;
    let mut sched = scheduler(engine, &mut arena);
    sched.wake(&mut board, &mut net, &nvs, &mut sink);

    let tier = sched.step(&mut board, &mut nvs, &mut sink);
    assert_eq!(tier, SleepTier::LightSleep(8_000_000));
    assert!(!sched.reading().valid);
}

#[test]
fn run_returns_power_off_duration() {
    let clock = SimClock::new(true);
    let mut board = MockBoard::new(&clock, WakeCause::ColdBoot);
    let mut net = MockNet::new(&clock, true);
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::new();
    let mut arena = CheckpointArena::zeroed();

    let mut sched = scheduler(MockEngine::new(&clock, ULP_NS), &mut arena);
    let off = sched.run(&mut board, &mut net, &mut nvs, &mut sink);
    assert_eq!(off.sleep_us, 300_000_000);
    assert_eq!(sched.schedule().next_call_ns, clock.now() + ULP_NS);
}
