//! Two-tier checkpointing: clock gating, cadence and power removal.

use airnode::app::events::{AppEvent, Direction};
use airnode::app::ports::{FusionEngine, StorageError};
use airnode::checkpoint::{CheckpointArena, CheckpointStore, SkipReason, Tier, Transfer};
use airnode::config::NodeConfig;
use airnode::error::CheckpointError;
use airnode::fusion::{FusionSession, SampleRate, StateBlob, STATE_BLOB_LEN};
use airnode::power::WakeCause;
use airnode::scheduler::Scheduler;

use crate::mock_hw::{MockBoard, MockEngine, MockNet, MockNvs, RecordingSink, SimClock};

const CFG: &[u8] = b"engine-config";
const ULP_NS: i64 = 300_000_000_000;

fn durable_saves(sink: &RecordingSink) -> usize {
    sink.events
        .iter()
        .filter(|e| {
            matches!(
                e,
                AppEvent::Checkpoint {
                    tier: Tier::Durable,
                    direction: Direction::Save,
                    outcome: Ok(Transfer::Done),
                }
            )
        })
        .count()
}

// ── Store operations ──────────────────────────────────────────

#[test]
fn retained_round_trip_reproduces_blob() {
    let clock = SimClock::new(true);
    let board = MockBoard::new(&clock, WakeCause::Timer);
    let store = CheckpointStore::new(2024);
    let mut arena = CheckpointArena::zeroed();

    let mut old = MockEngine::new(&clock, ULP_NS);
    old.state = StateBlob([0xC3; STATE_BLOB_LEN]);
    assert_eq!(store.save_to_retained(&board, &mut arena, &mut old), Ok(Transfer::Done));

    let mut fresh = MockEngine::new(&clock, ULP_NS);
    assert_eq!(store.load_from_retained(&board, &arena, &mut fresh), Ok(Transfer::Done));
    assert_eq!(fresh.imported, Some(StateBlob([0xC3; STATE_BLOB_LEN])));
}

#[test]
fn durable_round_trip_reproduces_blob() {
    let clock = SimClock::new(true);
    let board = MockBoard::new(&clock, WakeCause::Timer);
    let store = CheckpointStore::new(2024);
    let mut nvs = MockNvs::new();

    let mut old = MockEngine::new(&clock, ULP_NS);
    old.state = StateBlob([0x3C; STATE_BLOB_LEN]);
    assert_eq!(store.save_to_durable(&board, &mut nvs, &mut old), Ok(Transfer::Done));
    assert_eq!(nvs.durable_blob().map(Vec::len), Some(STATE_BLOB_LEN));

    let mut fresh = MockEngine::new(&clock, ULP_NS);
    assert_eq!(store.load_from_durable(&board, &nvs, &mut fresh), Ok(Transfer::Done));
    assert_eq!(fresh.imported, Some(StateBlob([0x3C; STATE_BLOB_LEN])));
}

#[test]
fn invalid_clock_leaves_both_tiers_untouched() {
    let clock = SimClock::new(false);
    let board = MockBoard::new(&clock, WakeCause::Timer);
    let store = CheckpointStore::new(2024);
    let mut nvs = MockNvs::new();
    nvs.put_durable(&[0x11; STATE_BLOB_LEN]);
    let mut arena = CheckpointArena::zeroed();
    let before = arena.clone();
    let mut engine = MockEngine::new(&clock, ULP_NS);

    let skipped = Ok(Transfer::Skipped(SkipReason::ClockInvalid));
    assert_eq!(store.save_to_retained(&board, &mut arena, &mut engine), skipped);
    assert_eq!(store.load_from_retained(&board, &arena, &mut engine), skipped);
    assert_eq!(store.save_to_durable(&board, &mut nvs, &mut engine), skipped);
    assert_eq!(store.load_from_durable(&board, &nvs, &mut engine), skipped);

    assert_eq!(arena, before);
    assert!(!nvs.touched());
    assert_eq!(nvs.durable_blob(), Some(&vec![0x11; STATE_BLOB_LEN]));
    assert_eq!(engine.imported, None);
}

#[test]
fn wrong_size_durable_blob_is_an_error() {
    let clock = SimClock::new(true);
    let board = MockBoard::new(&clock, WakeCause::Timer);
    let store = CheckpointStore::new(2024);
    let mut engine = MockEngine::new(&clock, ULP_NS);

    let mut nvs = MockNvs::new();
    nvs.put_durable(&[0x11; 100]);
    assert_eq!(
        store.load_from_durable(&board, &nvs, &mut engine),
        Err(CheckpointError::Storage(StorageError::SizeMismatch))
    );

    nvs.put_durable(&[0x11; STATE_BLOB_LEN + 1]);
    assert_eq!(
        store.load_from_durable(&board, &nvs, &mut engine),
        Err(CheckpointError::Storage(StorageError::SizeMismatch))
    );
    assert_eq!(engine.imported, None);
}

#[test]
fn rejected_state_reports_engine_error() {
    let clock = SimClock::new(true);
    let board = MockBoard::new(&clock, WakeCause::Timer);
    let store = CheckpointStore::new(2024);
    let mut nvs = MockNvs::new();
    nvs.put_durable(&[0x11; STATE_BLOB_LEN]);

    let mut engine = MockEngine::new(&clock, ULP_NS);
    engine.reject_state = true;
    assert_eq!(
        store.load_from_durable(&board, &nvs, &mut engine),
        Err(CheckpointError::EngineRejected)
    );
}

#[test]
fn failed_flash_write_is_not_fatal() {
    let clock = SimClock::new(true);
    let board = MockBoard::new(&clock, WakeCause::Timer);
    let store = CheckpointStore::new(2024);
    let mut nvs = MockNvs::new();
    nvs.fail_writes = true;
    let mut engine = MockEngine::new(&clock, ULP_NS);

    assert_eq!(
        store.save_to_durable(&board, &mut nvs, &mut engine),
        Err(CheckpointError::Storage(StorageError::IoError))
    );
    // The engine is still usable afterwards.
    let mut blob = StateBlob::zeroed();
    assert!(engine.get_state(&mut blob));
}

// ── Cadence across power-off cycles ───────────────────────────

/// One boot: wake, sample until power-off, return the power-off duration.
fn boot(
    board: &mut MockBoard,
    net: &mut MockNet,
    nvs: &mut MockNvs,
    sink: &mut RecordingSink,
    arena: &mut CheckpointArena,
    config: &NodeConfig,
) -> u64 {
    let engine = MockEngine::new(&board.clock, ULP_NS);
    let session = FusionSession::new(engine, CFG, SampleRate::Ulp);
    let mut sched = Scheduler::new(config.clone(), session, arena);
    sched.run(board, net, nvs, sink).sleep_us
}

#[test]
fn six_power_offs_write_flash_once() {
    let clock = SimClock::new(true);
    let mut board = MockBoard::new(&clock, WakeCause::ColdBoot);
    let mut net = MockNet::new(&clock, true);
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::new();
    let mut arena = CheckpointArena::zeroed();
    let config = NodeConfig::default();
    assert_eq!(config.durable_save_every, 6);

    for _ in 0..6 {
        let sleep_us = boot(&mut board, &mut net, &mut nvs, &mut sink, &mut arena, &config);
        board.power_cycle(sleep_us);
    }

    assert_eq!(nvs.writes, 1);
    assert_eq!(durable_saves(&sink), 1);
    assert_eq!(arena.schedule.cycles(), 0, "counter resets after a durable save");
    assert!(arena.checkpoint.is_valid());

    // Imminent power removal forces a second write.
    let engine = MockEngine::new(&clock, ULP_NS);
    let mut sched = Scheduler::new(
        config.clone(),
        FusionSession::new(engine, CFG, SampleRate::Ulp),
        &mut arena,
    );
    sched.wake(&mut board, &mut net, &nvs, &mut sink);
    sched.on_power_removal(&board, &mut nvs, &mut sink);
    assert_eq!(nvs.writes, 2);
    assert_eq!(durable_saves(&sink), 2);
}

#[test]
fn low_battery_forces_durable_save() {
    let clock = SimClock::new(true);
    let mut board = MockBoard::new(&clock, WakeCause::ColdBoot);
    board.battery = Ok(3200);
    let mut net = MockNet::new(&clock, true);
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::new();
    let mut arena = CheckpointArena::zeroed();

    boot(&mut board, &mut net, &mut nvs, &mut sink, &mut arena, &NodeConfig::default());

    assert_eq!(nvs.writes, 1);
    assert_eq!(durable_saves(&sink), 1);
}

#[test]
fn unsynced_node_never_touches_flash() {
    let clock = SimClock::new(false);
    let mut board = MockBoard::new(&clock, WakeCause::ColdBoot);
    let mut net = MockNet::new(&clock, false);
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::new();
    let mut arena = CheckpointArena::zeroed();
    let config = NodeConfig::default();

    for _ in 0..7 {
        let sleep_us = boot(&mut board, &mut net, &mut nvs, &mut sink, &mut arena, &config);
        board.power_cycle(sleep_us);
    }

    assert!(!nvs.touched());
    assert!(!arena.checkpoint.is_valid());
    assert_eq!(durable_saves(&sink), 0);
}
