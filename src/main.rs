//! # Telemetry Bridge
//!
//! Vehicle-side application: runs the acquisition loops, serves ground
//! consoles over UDP and relays the snapshot over the radio link.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::WriteHalf;
use tokio::sync::{mpsc, Mutex};
use tokio_serial::SerialStream;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use telemetry_bridge::config::Config;
use telemetry_bridge::devices::{
    AnalogSampler, DeviceManager, SnapshotTransmitter, SystemStatusMonitor, Watchdog,
};
use telemetry_bridge::logs::LogSink;
use telemetry_bridge::net::TelemetryServer;
use telemetry_bridge::radio::{
    spawn_receiver, ApiMode, ModemConfig, RadioEvent, RadioLink, RfDataRate, TxPowerLevel,
};
use telemetry_bridge::sensors::TelemetryState;
use telemetry_bridge::serial::TokioSerialPort;

type RadioPort = TokioSerialPort<WriteHalf<SerialStream>>;

const CONFIG_PATH: &str = "config/default.toml";

/// Capacity of the radio event channel
const RADIO_EVENT_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config {} not loaded ({}), using defaults", CONFIG_PATH, e);
            Config::default()
        }
    };

    let sink = LogSink::new(config.logging.log_dirs.iter().cloned())
        .context("failed to create log directories")?;
    init_tracing(&sink);

    info!("Telemetry bridge v{} starting", env!("CARGO_PKG_VERSION"));

    // Local snapshot: sensors on this vehicle. Remote snapshot: whatever
    // arrives over the radio link.
    let local = Arc::new(TelemetryState::new());
    let remote = Arc::new(TelemetryState::new());

    let mut manager = DeviceManager::new();
    setup_analog(&config, &mut manager, &local, &sink)?;
    setup_status_monitor(&config, &mut manager, &local, &sink)?;

    let mut server = TelemetryServer::bind(&config.network.bind_addr, Arc::clone(&local))
        .await
        .context("failed to start telemetry server")?;

    let mut watchdog = setup_radio(&config, &mut manager, &local, &remote, &sink).await;

    info!("Running; press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    if let Some(watchdog) = watchdog.as_mut() {
        info!("Stopping watchdog");
        watchdog.stop().await;
    }
    info!("Stopping server");
    server.stop().await;
    info!("{}", manager.frequency_report());
    info!("Stopping device manager");
    manager.clear().await;

    Ok(())
}

/// Console output plus a plain-text copy in the first log directory
fn init_tracing(sink: &LogSink) {
    let file_appender = tracing_appender::rolling::never(&sink.directories()[0], "log.txt");

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false),
        )
        .init();
}

/// Register the six analog acquisition loops
///
/// The ADC drivers are external collaborators; until real hardware is
/// wired in, a synthetic source stands in for each channel.
fn setup_analog(
    config: &Config,
    manager: &mut DeviceManager,
    local: &Arc<TelemetryState>,
    sink: &LogSink,
) -> Result<()> {
    for index in 0..telemetry_bridge::sensors::ANALOG_CHANNELS {
        let log = sink
            .create_record_log(&format!("A{}.log", index))
            .context("failed to create analog channel log")?;

        let mut phase: f32 = index as f32;
        let driver = move || {
            phase += 0.01;
            Ok(2500.0 + 500.0 * phase.sin())
        };

        let sampler = AnalogSampler::new(index, Arc::clone(local), driver).with_log(log);
        let handle = manager.add(sampler);
        handle.set_throttle(config.devices.analog_target_hz);
    }
    Ok(())
}

fn setup_status_monitor(
    config: &Config,
    manager: &mut DeviceManager,
    local: &Arc<TelemetryState>,
    sink: &LogSink,
) -> Result<()> {
    let log = sink
        .create_record_log("status.log")
        .context("failed to create status channel log")?;

    let monitor =
        SystemStatusMonitor::new(Arc::clone(local), &config.devices.thermal_zone).with_log(log);
    let handle = manager.add(monitor);
    handle.set_frequency(1.0)?;
    Ok(())
}

/// Bring up the radio link, transmitter and watchdog
///
/// A missing radio port is not fatal; the bridge still serves consoles
/// over UDP.
async fn setup_radio(
    config: &Config,
    manager: &mut DeviceManager,
    local: &Arc<TelemetryState>,
    remote: &Arc<TelemetryState>,
    sink: &LogSink,
) -> Option<Watchdog> {
    let port = match telemetry_bridge::serial::open(&config.radio.port, config.radio.baud_rate) {
        Ok(port) => port,
        Err(e) => {
            warn!("Radio unavailable ({}); running without radio link", e);
            return None;
        }
    };

    let (reader, writer) = tokio::io::split(port);
    let (events_tx, mut events_rx) = mpsc::channel::<RadioEvent>(RADIO_EVENT_CAPACITY);

    let mut link: RadioLink<RadioPort> =
        RadioLink::new(TokioSerialPort::new(writer), events_tx.clone());

    let rx_log: Option<Box<dyn std::io::Write + Send>> = match sink.create("radio-rx.log") {
        Ok(stream) => Some(Box::new(stream)),
        Err(e) => {
            warn!("Radio receive log unavailable: {}", e);
            None
        }
    };
    spawn_receiver(reader, link.api_mode_cell(), events_tx, rx_log);

    link.power_on().await;
    let modem_config = ModemConfig::new()
        .rf_data_rate(RfDataRate::Baud115200)
        .tx_power_level(TxPowerLevel::Milliwatt1000)
        .retries(0)
        .api_mode(ApiMode::Framed);
    if let Err(e) = link.enter_command_mode().await {
        warn!("Could not enter command mode: {}", e);
    } else if let Err(e) = link.write_config(&modem_config).await {
        warn!("Could not configure modem: {}", e);
    }

    let link = Arc::new(Mutex::new(link));
    let transmitter = SnapshotTransmitter::new(Arc::clone(local), link);
    let handle = manager.add_paused(transmitter, true);
    if let Err(e) = handle.set_frequency(config.radio.transmit_rate_hz) {
        warn!("Invalid transmit rate: {}", e);
    }

    let mut watchdog = Watchdog::new(
        Duration::from_secs(config.radio.watchdog_timeout_s),
        handle.clone(),
    );
    watchdog.start();
    watchdog.enable();

    // Radio event dispatch: feed the watchdog, track signal strength and
    // decode remote snapshots out of received packets
    let observer = watchdog.observer();
    let remote = Arc::clone(remote);
    let local = Arc::clone(local);
    let transmitter_handle = handle.clone();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            observer.observe(&event);
            match &event {
                RadioEvent::Received(packet) => {
                    local.radio.set_signal_strength(packet.signal_strength);
                    let mut payload = bytes::Bytes::copy_from_slice(&packet.payload);
                    if let Err(e) = remote.decode(&mut payload, 0) {
                        warn!("Undecodable remote snapshot: {}", e);
                    }
                }
                // Power-off means the transmitter must not keep cycling;
                // the link does not enforce this itself
                RadioEvent::PoweredOff => {
                    if !transmitter_handle.is_paused() {
                        transmitter_handle.pause();
                    }
                }
                _ => {}
            }
        }
    });

    Some(watchdog)
}
