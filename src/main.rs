//! airnode firmware: main entry point.
//!
//! One boot is one pass through the sampling loop; the program ends in
//! deep sleep and the next timer wake starts it from the top.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  Esp32Board              BsecEngine     NvsAdapter             │
//! │  (Clock+Power+Bus+Batt)  (FusionEngine) (Config+Storage)       │
//! │  NetworkTime             LogEventSink   retained arena         │
//! │  (TimeSync)              (EventSink)    (RTC no-init RAM)      │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  Scheduler · FusionSession · CheckpointStore           │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use log::{error, info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;

use airnode::adapters::board::Esp32Board;
use airnode::adapters::bsec::{self, BsecEngine};
use airnode::adapters::log_sink::LogEventSink;
use airnode::adapters::nvs::NvsAdapter;
use airnode::adapters::retained;
use airnode::adapters::time_sync::{self, NetworkTime};
use airnode::app::events::AppEvent;
use airnode::app::ports::{ConfigPort, EventSink};
use airnode::config::NodeConfig;
use airnode::fusion::FusionSession;
use airnode::scheduler::Scheduler;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  airnode v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let mut sink = LogEventSink::new();

    // ── 2. Persistent storage ─────────────────────────────────
    // Running without NVS would lose calibration on every power cut
    // and never reach the durable tier; park instead.
    let mut nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            error!("NVS init failed ({}), halting", e);
            sink.emit(&AppEvent::Status("NVS FAIL!"));
            Esp32Board::new(NodeConfig::default().battery_divider).halt();
        }
    };
    let config = nvs.load().unwrap_or_else(|e| {
        warn!("NVS config load failed ({}), using defaults", e);
        NodeConfig::default()
    });
    time_sync::apply_timezone(&config.timezone);

    // ── 3. Board, retained memory, adapters ───────────────────
    let mut board = Esp32Board::new(config.battery_divider);
    let Some(arena) = retained::take() else {
        anyhow::bail!("retained arena already claimed");
    };
    let mut net = NetworkTime::new(&config, peripherals.modem, sysloop);
    let session = FusionSession::new(BsecEngine::new(), bsec::default_config(), config.sample_rate);

    // ── 4. Sample until the schedule calls for power-off ──────
    let mut scheduler = Scheduler::new(config, session, arena);
    let power_off = scheduler.run(&mut board, &mut net, &mut nvs, &mut sink);

    board.deep_sleep(power_off.sleep_us)
}
