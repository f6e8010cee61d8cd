//! TapStation Firmware
//! ESP32 DevKit + PN5180 NFC frontend (SPI) + status LED
//!
//! Reads ISO14443A cards and reports each tap to the attendance service.
//! Configuration is baked in at build time from `TAPSTATION_*` variables,
//! e.g. `TAPSTATION_ENDPOINT=http://10.0.0.2:5000/api/attendance cargo build`.

use std::time::Duration;

use esp_idf_hal::delay::Delay;
use esp_idf_hal::gpio::{OutputPin, PinDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::spi::config::{Config as SpiConfig, MODE_0};
use esp_idf_hal::spi::{SpiDeviceDriver, SpiDriver, SpiDriverConfig};
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{error, info, warn};
use tapstation_core::{
    halt_forever, AttendanceReporter, CardReader, Config, ConnectivityManager, Error, LogSink,
    SessionController, SessionTiming, SystemClock, Tee,
};

mod feedback;
mod http_client;
mod nfc;
mod portal;
mod wifi_init;

use feedback::LedSink;
use http_client::EspHttpTransport;
use nfc::Pn5180;
use wifi_init::EspNetworkLink;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

fn main() {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("========================================");
    info!("TapStation Firmware v{}", env!("CARGO_PKG_VERSION"));
    info!("ESP32 + PN5180 attendance terminal");
    info!("========================================");

    if let Err(e) = run() {
        error!("Startup failed: {:?}", e);
    }
    warn!("Restarting...");
    esp_idf_hal::reset::restart();
}

/// Returns only on startup failures; fatal session errors restart or halt
/// from inside.
fn run() -> anyhow::Result<()> {
    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    // Status LED on the DevKit's onboard GPIO2
    let led = PinDriver::output(pins.gpio2.downgrade_output())?;
    let mut sink = Tee::new(LogSink, LedSink::new(led));

    // A rebuild is the only fix for bad baked-in settings
    let config = match Config::from_lookup(build_time_setting) {
        Ok(config) => config,
        Err(e) => halt_forever(
            &mut sink,
            &mut SystemClock::new(),
            &Error::from(e),
            SessionTiming::default().halt_interval,
        ),
    };
    info!("Device {} reporting to {}", config.device_id, config.endpoint);

    // PN5180 on VSPI
    info!("[1/3] Initializing PN5180...");
    let spi = SpiDriver::new(
        peripherals.spi2,
        pins.gpio18,       // SCK
        pins.gpio23,       // MOSI
        Some(pins.gpio19), // MISO
        &SpiDriverConfig::new(),
    )?;
    let spi = SpiDeviceDriver::new(
        spi,
        Some(pins.gpio5), // NSS
        &SpiConfig::new().baudrate(Hertz(2_000_000)).data_mode(MODE_0),
    )?;
    let busy = PinDriver::input(pins.gpio16)?;
    let rst = PinDriver::output(pins.gpio17)?;
    let pn5180 = Pn5180::new(spi, busy, rst, Delay::new_default());

    let reader = match CardReader::init(pn5180, config.timing.reader_timeout, config.uid_case) {
        Ok(reader) => reader,
        Err(e) => halt_forever(&mut sink, &mut SystemClock::new(), &e, config.timing.halt_interval),
    };
    info!("  PN5180 firmware {}", reader.firmware());

    info!("[2/3] Initializing WiFi...");
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take().ok();
    let link = EspNetworkLink::new(peripherals.modem, sysloop, nvs)?;
    let connectivity = ConnectivityManager::new(link, &config);

    let reporter = AttendanceReporter::new(
        EspHttpTransport::new(HTTP_TIMEOUT),
        config.endpoint.clone(),
        config.status_url.clone(),
    );

    info!("[3/3] Starting session");
    let mut session = SessionController::new(reader, connectivity, reporter, sink, SystemClock::new(), &config);
    let e = match session.run() {
        Ok(never) => match never {},
        Err(e) => e,
    };
    if e.is_restart_required() {
        warn!("{}", e);
        return Ok(());
    }
    session.halt(&e)
}

/// `TAPSTATION_*` values captured when the firmware was built.
fn build_time_setting(key: &str) -> Option<String> {
    let value = match key {
        "TAPSTATION_DEVICE_ID" => option_env!("TAPSTATION_DEVICE_ID"),
        "TAPSTATION_ENDPOINT" => option_env!("TAPSTATION_ENDPOINT"),
        "TAPSTATION_STATUS_URL" => option_env!("TAPSTATION_STATUS_URL"),
        "TAPSTATION_WIFI_SSID" => option_env!("TAPSTATION_WIFI_SSID"),
        "TAPSTATION_WIFI_PASSWORD" => option_env!("TAPSTATION_WIFI_PASSWORD"),
        "TAPSTATION_RESET_CREDENTIALS" => option_env!("TAPSTATION_RESET_CREDENTIALS"),
        "TAPSTATION_PORTAL_SSID" => option_env!("TAPSTATION_PORTAL_SSID"),
        "TAPSTATION_PORTAL_PASSWORD" => option_env!("TAPSTATION_PORTAL_PASSWORD"),
        "TAPSTATION_PORTAL_TIMEOUT_SECS" => option_env!("TAPSTATION_PORTAL_TIMEOUT_SECS"),
        "TAPSTATION_RECONNECT_ATTEMPTS" => option_env!("TAPSTATION_RECONNECT_ATTEMPTS"),
        "TAPSTATION_RECONNECT_INTERVAL_MS" => option_env!("TAPSTATION_RECONNECT_INTERVAL_MS"),
        "TAPSTATION_IDLE_INTERVAL_SECS" => option_env!("TAPSTATION_IDLE_INTERVAL_SECS"),
        "TAPSTATION_COOLDOWN_MS" => option_env!("TAPSTATION_COOLDOWN_MS"),
        "TAPSTATION_UID_CASE" => option_env!("TAPSTATION_UID_CASE"),
        _ => None,
    };
    value.map(str::to_string)
}
