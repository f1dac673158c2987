//! # homesecd — simulated home-security devices
//!
//! Composition root that wires the transport adapters to the device
//! use-cases.
//!
//! ## Responsibilities
//! - Parse configuration (CLI args, env vars, config file)
//! - Construct the session factory (MQTT, or the in-process bus for `simulate`)
//! - Build publishers and the actuator dispatcher from device settings
//! - Run every requested device until Ctrl-C, then shut down gracefully
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use homesec_adapter_mqtt::MqttSessionFactory;
use homesec_app::bus::InProcessBus;
use homesec_app::observer::{LoggingObserver, ObserverSet};
use homesec_domain::device::DeviceKind;
use homesec_domain::error::HomeSecError;

pub mod cli;
pub mod config;
pub mod fleet;

use cli::Command;
use config::{Config, ConfigError};
use fleet::{DeviceLaunch, FleetSettings, LinkStats};

/// Errors that stop the daemon.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Device(#[from] HomeSecError),
}

/// Run `command` with `config` until `cancel` fires or a device fails.
///
/// # Errors
///
/// Returns a [`DaemonError`] for invalid settings or a failed device.
pub async fn run(
    command: Command,
    mut config: Config,
    cancel: CancellationToken,
) -> Result<(), DaemonError> {
    let launches = match &command {
        Command::Door(args) => sensor(args, DeviceKind::Door, &mut config)?,
        Command::Window(args) => sensor(args, DeviceKind::Window, &mut config)?,
        Command::Motion(args) => sensor(args, DeviceKind::Motion, &mut config)?,
        Command::Listen(args) => {
            args.apply(&mut config)?;
            config.validate()?;
            vec![DeviceLaunch::listener(&config)?]
        }
        Command::All => {
            config.validate()?;
            DeviceLaunch::all(&config)?
        }
        Command::Simulate(args) => {
            args.apply(&mut config);
            config.validate()?;
            let duration = args.duration.map(Duration::from_secs);
            return simulate(&config, duration, cancel).await;
        }
    };

    let stats = Arc::new(LinkStats::default());
    let settings = settings(&config, &stats);
    let policy = config.reconnect_policy();
    tracing::info!(
        endpoint = %settings.session.endpoint(),
        durable = settings.session.durable,
        reconnect = policy.retries(),
        devices = launches.len(),
        "starting devices"
    );
    let factory = MqttSessionFactory::new(config.mqtt.clone(), policy);
    let result = fleet::run_fleet(factory, settings, launches, cancel).await;
    log_stats(&stats);
    result?;
    Ok(())
}

fn sensor(
    args: &cli::SensorArgs,
    kind: DeviceKind,
    config: &mut Config,
) -> Result<Vec<DeviceLaunch>, ConfigError> {
    args.apply(kind, config)?;
    config.validate()?;
    Ok(vec![DeviceLaunch::sensor(config, kind)?])
}

fn settings(config: &Config, stats: &Arc<LinkStats>) -> FleetSettings {
    let observers = ObserverSet::new()
        .with(Arc::new(LoggingObserver))
        .with(stats.clone());
    FleetSettings {
        session: config.session_config(),
        observer: Arc::new(observers),
        shutdown_grace: config.shutdown_grace(),
    }
}

fn log_stats(stats: &LinkStats) {
    tracing::info!(
        connects = stats.connects(),
        resumed = stats.resumed(),
        drops = stats.drops(),
        "devices stopped"
    );
}

/// Every device plus a command emitter on an in-process bus.
///
/// # Errors
///
/// Returns a [`DaemonError`] for invalid settings or a failed device.
pub async fn simulate(
    config: &Config,
    duration: Option<Duration>,
    cancel: CancellationToken,
) -> Result<(), DaemonError> {
    let bus = InProcessBus::new();
    let launches = DeviceLaunch::all(config)?;
    tracing::info!(devices = launches.len(), "starting in-process simulation");

    if let Some(duration) = duration {
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            stopper.cancel();
        });
    }

    let emitter = tokio::spawn(fleet::emit_commands(
        bus.clone(),
        Duration::from_secs(config.simulate.command_interval_secs),
        fleet::command_rng(None),
        cancel.clone(),
    ));
    let stats = Arc::new(LinkStats::default());
    let result = fleet::run_fleet(bus, settings(config, &stats), launches, cancel.clone()).await;
    cancel.cancel();
    log_stats(&stats);
    match emitter.await {
        Ok(emitted) => tracing::info!(emitted, "command emitter stopped"),
        Err(err) => tracing::warn!(error = %err, "command emitter failed"),
    }
    result?;
    Ok(())
}
