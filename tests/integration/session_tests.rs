//! Fusion session bring-up and merge behaviour with a scripted engine.

use airnode::error::SessionError;
use airnode::fusion::{
    BusHandle, FusedOutput, FusionSession, MergedReading, OutputId, SUBSCRIPTION, SampleRate,
};

use crate::mock_hw::{MockEngine, SimClock};

const CFG: &[u8] = b"engine-config";
const BUS: Option<BusHandle> = Some(BusHandle::from_raw(0x1C));
const PERIOD_NS: i64 = 3_000_000_000;

fn ready_session(engine: MockEngine) -> FusionSession<MockEngine> {
    let mut s = FusionSession::new(engine, CFG, SampleRate::Lp);
    s.initialize(BUS, |_| {}).unwrap();
    s
}

#[test]
fn warm_up_samples_are_not_fused() {
    let clock = SimClock::new(true);
    let mut s = ready_session(MockEngine::new(&clock, PERIOD_NS));
    let mut r = MergedReading::default();

    r.begin_cycle();
    s.run_once(&mut r).unwrap();

    assert!(r.valid);
    assert!(!r.is_fused);
    assert_eq!(r.iaq, 0.0);
    assert_eq!(r.iaq_accuracy, 0);
    assert_eq!(r.temperature, 21.5);
    assert_eq!(r.pressure, 1008.0);
}

#[test]
fn fused_after_warm_up_clears_on_next_raw_cycle() {
    let clock = SimClock::new(true);
    let engine = MockEngine::new(&clock, PERIOD_NS).with_outputs(vec![
        FusedOutput::new(OutputId::Iaq, 80.0, 2),
        FusedOutput::new(OutputId::RawPressure, 1001.0, 3),
    ]);
    let mut s = ready_session(engine);
    let mut r = MergedReading::default();

    r.begin_cycle();
    s.run_once(&mut r).unwrap();
    assert!(r.is_fused);
    assert_eq!(r.iaq, 80.0);
    assert_eq!(r.iaq_accuracy, 2);
    assert_eq!(r.pressure, 1001.0);

    // Engine drops back to warm-up (e.g. after a rejected state import).
    s.engine_mut().outputs.clear();
    clock.advance_us(3_000_000);
    r.begin_cycle();
    s.run_once(&mut r).unwrap();
    assert!(r.valid && !r.is_fused);
    assert_eq!(r.iaq, 0.0);
    assert_eq!(r.iaq_accuracy, 0);
}

#[test]
fn heat_compensated_temperature_wins_over_raw() {
    let clock = SimClock::new(true);
    let engine = MockEngine::new(&clock, PERIOD_NS).with_outputs(vec![
        FusedOutput::new(OutputId::RawTemperature, 26.0, 3),
        FusedOutput::new(OutputId::HeatCompensatedTemperature, 23.2, 3),
        FusedOutput::new(OutputId::RawTemperature, 26.0, 3),
    ]);
    let mut s = ready_session(engine);
    let mut r = MergedReading::default();

    s.run_once(&mut r).unwrap();
    assert_eq!(r.temperature, 23.2);
}

#[test]
fn raw_temperature_fills_an_unmeasured_field_only() {
    let clock = SimClock::new(true);
    let engine = MockEngine::new(&clock, PERIOD_NS)
        .with_outputs(vec![FusedOutput::new(OutputId::RawTemperature, 26.0, 3)]);
    let mut s = ready_session(engine);

    let mut fresh = MergedReading::default();
    s.run_once(&mut fresh).unwrap();
    assert_eq!(fresh.temperature, 26.0);

    clock.advance_us(3_000_000);
    let mut known = MergedReading {
        temperature: 19.0,
        ..Default::default()
    };
    s.run_once(&mut known).unwrap();
    assert_eq!(known.temperature, 19.0);
}

#[test]
fn unknown_tags_are_ignored() {
    let clock = SimClock::new(true);
    let engine = MockEngine::new(&clock, PERIOD_NS).with_outputs(vec![
        FusedOutput {
            tag: 200,
            signal: 1.0,
            accuracy: 0,
        },
        FusedOutput::new(OutputId::StabilizationStatus, 1.0, 0),
        FusedOutput::new(OutputId::RunInStatus, 1.0, 0),
    ]);
    let mut s = ready_session(engine);
    let mut r = MergedReading::default();

    s.run_once(&mut r).unwrap();
    assert!(r.is_fused);
    assert_eq!(r.stabilization_status, 1);
    assert_eq!(r.run_in_status, 1);
}

#[test]
fn not_due_leaves_reading_invalid() {
    let clock = SimClock::new(true);
    let mut engine = MockEngine::new(&clock, PERIOD_NS);
    engine.next_call = clock.now() + PERIOD_NS;
    let mut s = ready_session(engine);
    let mut r = MergedReading::default();

    s.run_once(&mut r).unwrap();
    assert!(!r.valid);
    assert_eq!(s.engine().samples, 0);
    assert_eq!(s.next_due_time_ns(), clock.now() + PERIOD_NS);
    assert_eq!(s.next_due_time_ms(), (clock.now() + PERIOD_NS) / 1_000_000);
}

#[test]
fn run_failure_carries_engine_status() {
    let clock = SimClock::new(true);
    let mut engine = MockEngine::new(&clock, PERIOD_NS);
    engine.fail_run = true;
    let mut s = ready_session(engine);
    let mut r = MergedReading::default();

    assert_eq!(s.run_once(&mut r), Err(SessionError::Run(-2)));
    assert!(!r.valid);
}

#[test]
fn bring_up_subscribes_fixed_output_set() {
    let clock = SimClock::new(true);
    let s = ready_session(MockEngine::new(&clock, PERIOD_NS));
    assert_eq!(s.engine().subscribed, SUBSCRIPTION.to_vec());
    assert_eq!(s.engine().init_calls, 1);
}

#[test]
fn engine_init_failure_leaves_session_down() {
    let clock = SimClock::new(true);
    let mut engine = MockEngine::new(&clock, PERIOD_NS);
    engine.fail_init = true;
    let mut s = FusionSession::new(engine, CFG, SampleRate::Ulp);

    let mut restored = false;
    assert_eq!(s.initialize(BUS, |_| restored = true), Err(SessionError::Init));
    assert!(!restored);
    assert!(!s.is_ready());
}
