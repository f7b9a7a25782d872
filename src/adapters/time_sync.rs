//! Network time adapter.
//!
//! Implements [`TimeSyncPort`]: bring the WiFi station up, let SNTP set
//! the system clock, then tear the radio down again.  The radio is only
//! ever powered on a wake whose wall clock failed the validity check, so
//! in steady state this adapter is never called.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::BlockingWifi` + `EspSntp`.
//! - **all other targets**: sets the simulated wall clock to a fixed 2025
//!   instant.
//!
//! The station transmits at 13 dBm (`esp_wifi_set_max_tx_power(52)`); full
//! power browns out the battery rail during association.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{TimeSyncError, TimeSyncPort};
use crate::config::NodeConfig;

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    sntp::{EspSntp, SntpConf, SyncStatus},
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};

/// Quarter-dBm units: 52 × 0.25 = 13 dBm.
#[cfg(target_os = "espidf")]
const TX_POWER_QDBM: i8 = 52;

/// 2025-06-15T12:00:00Z, the instant the simulated SNTP server reports.
#[cfg(not(target_os = "espidf"))]
pub const SIM_SYNCED_EPOCH_SECS: i64 = 1_749_988_800;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

pub fn validate_ssid(ssid: &str) -> Result<(), TimeSyncError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(TimeSyncError::InvalidSsid);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), TimeSyncError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(TimeSyncError::InvalidPassword);
    }
    Ok(())
}

/// Apply a POSIX TZ string to the C library's local-time conversion.
///
/// Must be called before any other task exists; `setenv` is not
/// thread-safe.
pub fn apply_timezone(tz: &str) {
    #[cfg(target_os = "espidf")]
    {
        // SAFETY: single-threaded at the call sites (boot, post-sync).
        unsafe {
            std::env::set_var("TZ", tz);
            esp_idf_svc::sys::tzset();
        }
    }
    info!("Time: timezone set to {}", tz);
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct NetworkTime {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    ntp_server: heapless::String<48>,
    timezone: heapless::String<32>,
    max_retries: u8,
    poll_attempts: u8,
    poll_interval_ms: u32,
    #[cfg(target_os = "espidf")]
    modem: Modem,
    #[cfg(target_os = "espidf")]
    sysloop: EspSystemEventLoop,
}

impl NetworkTime {
    #[cfg(target_os = "espidf")]
    pub fn new(cfg: &NodeConfig, modem: Modem, sysloop: EspSystemEventLoop) -> Self {
        Self::with_parts(cfg, modem, sysloop)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(cfg: &NodeConfig) -> Self {
        Self::with_parts(cfg)
    }

    fn with_parts(
        cfg: &NodeConfig,
        #[cfg(target_os = "espidf")] modem: Modem,
        #[cfg(target_os = "espidf")] sysloop: EspSystemEventLoop,
    ) -> Self {
        Self {
            ssid: cfg.wifi_ssid.clone(),
            password: cfg.wifi_password.clone(),
            ntp_server: cfg.ntp_server.clone(),
            timezone: cfg.timezone.clone(),
            max_retries: cfg.wifi_max_retries,
            poll_attempts: cfg.sntp_poll_attempts.max(1),
            poll_interval_ms: cfg.sntp_poll_interval_ms,
            #[cfg(target_os = "espidf")]
            modem,
            #[cfg(target_os = "espidf")]
            sysloop,
        }
    }

    fn check_credentials(&self) -> Result<(), TimeSyncError> {
        if self.ssid.is_empty() {
            return Err(TimeSyncError::NoCredentials);
        }
        validate_ssid(&self.ssid)?;
        validate_password(&self.password)
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_sync(&mut self) -> Result<(), TimeSyncError> {
        let mut esp_wifi = EspWifi::new(&mut self.modem, self.sysloop.clone(), None)
            .map_err(|_| TimeSyncError::ConnectionFailed)?;
        let mut wifi = BlockingWifi::wrap(&mut esp_wifi, self.sysloop.clone())
            .map_err(|_| TimeSyncError::ConnectionFailed)?;

        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: self.ssid.as_str().try_into().map_err(|_| TimeSyncError::InvalidSsid)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| TimeSyncError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        }))
        .map_err(|_| TimeSyncError::ConnectionFailed)?;

        wifi.start().map_err(|_| TimeSyncError::ConnectionFailed)?;
        // SAFETY: the driver is started; the call only caps the PA output.
        let ret = unsafe { esp_idf_svc::sys::esp_wifi_set_max_tx_power(TX_POWER_QDBM) };
        if ret != esp_idf_svc::sys::ESP_OK {
            warn!("Time: could not cap TX power ({})", ret);
        }

        info!("Time: connecting to '{}'", self.ssid);
        let mut connected = false;
        for attempt in 0..=self.max_retries {
            match wifi.connect().and_then(|_| wifi.wait_netif_up()) {
                Ok(()) => {
                    connected = true;
                    break;
                }
                Err(e) => {
                    warn!("Time: connect attempt {} failed: {}", attempt + 1, e);
                    let _ = wifi.disconnect();
                }
            }
        }
        if !connected {
            let _ = wifi.stop();
            return Err(TimeSyncError::ConnectionFailed);
        }

        let result = await_sntp(&self.ntp_server, self.poll_attempts, self.poll_interval_ms);

        info!("Time: shutting WiFi down");
        let _ = wifi.disconnect();
        let _ = wifi.stop();
        result
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_sync(&mut self) -> Result<(), TimeSyncError> {
        info!(
            "Time(sim): '{}' via {} (retries={}, polls={}x{}ms)",
            self.ssid, self.ntp_server, self.max_retries, self.poll_attempts, self.poll_interval_ms
        );
        super::board::sim_set_wall_clock(SIM_SYNCED_EPOCH_SECS);
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
fn await_sntp(server: &str, attempts: u8, interval_ms: u32) -> Result<(), TimeSyncError> {
    let mut conf = SntpConf::default();
    conf.servers[0] = server;
    let sntp = EspSntp::new(&conf).map_err(|_| TimeSyncError::SntpTimeout)?;

    let interval = std::time::Duration::from_millis(u64::from(interval_ms));
    for attempt in 1..=attempts {
        if sntp.get_sync_status() == SyncStatus::Completed {
            info!("Time: SNTP synced after {} polls", attempt);
            return Ok(());
        }
        info!("Time: waiting for system time ({}/{})", attempt, attempts);
        std::thread::sleep(interval);
    }
    if sntp.get_sync_status() == SyncStatus::Completed {
        Ok(())
    } else {
        Err(TimeSyncError::SntpTimeout)
    }
}

impl TimeSyncPort for NetworkTime {
    fn sync_time(&mut self) -> Result<(), TimeSyncError> {
        self.check_credentials()?;
        self.platform_sync()?;
        apply_timezone(&self.timezone);
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
