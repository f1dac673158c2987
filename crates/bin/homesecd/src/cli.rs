//! Clap derive structures for the `homesecd` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use homesec_domain::device::DeviceKind;
use homesec_domain::qos::QualityOfService;

use crate::config::{Config, ConfigError};

/// homesecd -- simulated home-security devices over MQTT
#[derive(Debug, Parser)]
#[command(
    name = "homesecd",
    version,
    about = "Simulated door, window and motion sensors plus an actuator listener",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Configuration file (defaults to ./homesec.toml when present)
    #[arg(long, short = 'c', env = "HOMESEC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Publish random OPEN/CLOSED door readings
    Door(SensorArgs),

    /// Publish random OPEN/CLOSED window readings
    Window(SensorArgs),

    /// Publish random MOTION/NO_MOTION readings
    Motion(SensorArgs),

    /// Listen for alarm and light commands
    #[command(alias = "listener")]
    Listen(ListenerArgs),

    /// Run every device in one process against the broker
    All,

    /// Run every device plus a command emitter on an in-memory bus
    Simulate(SimulateArgs),
}

#[derive(Debug, Default, Args)]
pub struct SensorArgs {
    /// Device id, used verbatim as the MQTT client id
    #[arg(long)]
    pub device_id: Option<String>,

    /// Seconds between readings
    #[arg(long)]
    pub interval: Option<u64>,

    /// MQTT quality of service (0, 1 or 2)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub qos: Option<u8>,
}

#[derive(Debug, Default, Args)]
pub struct ListenerArgs {
    /// Device id, used verbatim as the MQTT client id
    #[arg(long)]
    pub device_id: Option<String>,

    /// Subscription quality of service (0, 1 or 2)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub qos: Option<u8>,
}

#[derive(Debug, Default, Args)]
pub struct SimulateArgs {
    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub duration: Option<u64>,

    /// Seconds between synthetic alarm/light commands
    #[arg(long)]
    pub command_interval: Option<u64>,
}

impl SensorArgs {
    /// Overlay the flags onto the `kind` sensor settings of `config`.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid QoS or a non-sensor kind.
    pub fn apply(&self, kind: DeviceKind, config: &mut Config) -> Result<(), ConfigError> {
        let sensor = config.sensor_mut(kind).ok_or_else(|| {
            ConfigError::Validation(format!("{kind} does not publish readings"))
        })?;
        if let Some(device_id) = &self.device_id {
            sensor.device_id.clone_from(device_id);
        }
        if let Some(interval) = self.interval {
            sensor.interval_secs = interval;
        }
        if let Some(qos) = self.qos {
            sensor.qos = parse_qos(qos)?;
        }
        Ok(())
    }
}

impl ListenerArgs {
    /// Overlay the flags onto the listener settings of `config`.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid QoS.
    pub fn apply(&self, config: &mut Config) -> Result<(), ConfigError> {
        let listener = &mut config.devices.listener;
        if let Some(device_id) = &self.device_id {
            listener.device_id.clone_from(device_id);
        }
        if let Some(qos) = self.qos {
            listener.qos = parse_qos(qos)?;
        }
        Ok(())
    }
}

impl SimulateArgs {
    /// Overlay the flags onto the simulation settings of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(interval) = self.command_interval {
            config.simulate.command_interval_secs = interval;
        }
    }
}

fn parse_qos(level: u8) -> Result<QualityOfService, ConfigError> {
    QualityOfService::try_from(level).map_err(|err| ConfigError::Validation(err.to_string()))
}
