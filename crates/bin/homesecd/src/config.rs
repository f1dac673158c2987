//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `homesec.toml` in the working directory unless a path is given.
//! Every field has a sensible default so the file is optional. Environment
//! variables take precedence over file values.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use homesec_adapter_mqtt::MqttConfig;
use homesec_app::reconnect::ReconnectPolicy;
use homesec_domain::device::{DeviceIdentity, DeviceKind};
use homesec_domain::qos::QualityOfService;
use homesec_domain::session::SessionConfig;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_PATH: &str = "homesec.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker endpoint and session settings.
    pub broker: BrokerConfig,
    /// MQTT transport tuning.
    pub mqtt: MqttConfig,
    /// What a session does after losing its link.
    pub reconnect: ReconnectConfig,
    /// Per-device defaults.
    pub devices: DevicesConfig,
    /// `simulate` command settings.
    pub simulate: SimulateConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Broker endpoint and session settings shared by every device.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Keep subscriptions and queued messages across reconnects.
    pub durable: bool,
    pub keep_alive_secs: u16,
    /// Time allowed for a graceful disconnect on shutdown, in milliseconds.
    pub shutdown_grace_ms: u64,
}

/// Reconnect policy settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// When `false`, the first link loss is fatal.
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

/// Defaults for each simulated device.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub door: SensorConfig,
    pub window: SensorConfig,
    pub motion: SensorConfig,
    pub listener: ListenerConfig,
}

/// One sensor's identity and publish schedule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub device_id: String,
    pub interval_secs: u64,
    pub qos: QualityOfService,
}

/// The actuator listener's identity and subscription QoS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub device_id: String,
    pub qos: QualityOfService,
}

/// In-process simulation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulateConfig {
    /// Seconds between synthetic alarm/light commands.
    pub command_interval_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `path` (or `homesec.toml` if `None`), then
    /// apply environment-variable overrides.
    ///
    /// Not validated: command-line flags are overlaid first, then the caller
    /// runs [`Config::validate`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or if an explicitly
    /// requested file cannot be read.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::from_file(DEFAULT_PATH)?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides read through `lookup`, in increasing precedence.
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for key in ["BROKER_URL", "HOMESEC_BROKER_HOST"] {
            if let Some(val) = lookup(key) {
                self.broker.host = val;
            }
        }
        for key in ["BROKER_PORT", "HOMESEC_BROKER_PORT"] {
            if let Some(val) = lookup(key)
                && let Ok(port) = val.parse()
            {
                self.broker.port = port;
            }
        }
        for key in ["HOMESEC_LOG", "RUST_LOG"] {
            if let Some(val) = lookup(key) {
                self.logging.filter = val;
            }
        }
    }

    /// Check the settings for values no device can run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::Validation("broker host must be set".to_string()));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        for (kind, sensor) in [
            (DeviceKind::Door, &self.devices.door),
            (DeviceKind::Window, &self.devices.window),
            (DeviceKind::Motion, &self.devices.motion),
        ] {
            if sensor.interval_secs == 0 {
                return Err(ConfigError::Validation(format!(
                    "{kind} interval must be non-zero"
                )));
            }
            sensor.identity(kind)?;
        }
        self.devices.listener.identity()?;
        if self.reconnect.enabled {
            if self.reconnect.initial_backoff_ms == 0 {
                return Err(ConfigError::Validation(
                    "initial backoff must be non-zero".to_string(),
                ));
            }
            if self.reconnect.initial_backoff_ms > self.reconnect.max_backoff_ms {
                return Err(ConfigError::Validation(
                    "initial backoff must not exceed max backoff".to_string(),
                ));
            }
        }
        if self.simulate.command_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "command interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Session settings shared by every device.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            endpoint_host: self.broker.host.clone(),
            endpoint_port: self.broker.port,
            durable: self.broker.durable,
            keep_alive_secs: self.broker.keep_alive_secs,
            ..SessionConfig::default()
        }
    }

    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        if !self.reconnect.enabled {
            return ReconnectPolicy::Terminate;
        }
        ReconnectPolicy::Bounded {
            max_attempts: self.reconnect.max_attempts,
            initial_backoff: Duration::from_millis(self.reconnect.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.reconnect.max_backoff_ms),
        }
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.broker.shutdown_grace_ms)
    }

    /// The sensor settings for `kind`, or `None` for the listener.
    #[must_use]
    pub fn sensor(&self, kind: DeviceKind) -> Option<&SensorConfig> {
        match kind {
            DeviceKind::Door => Some(&self.devices.door),
            DeviceKind::Window => Some(&self.devices.window),
            DeviceKind::Motion => Some(&self.devices.motion),
            DeviceKind::ActuatorListener => None,
        }
    }

    /// Mutable access to the sensor settings for `kind`.
    pub fn sensor_mut(&mut self, kind: DeviceKind) -> Option<&mut SensorConfig> {
        match kind {
            DeviceKind::Door => Some(&mut self.devices.door),
            DeviceKind::Window => Some(&mut self.devices.window),
            DeviceKind::Motion => Some(&mut self.devices.motion),
            DeviceKind::ActuatorListener => None,
        }
    }
}

impl SensorConfig {
    fn with_defaults(device_id: &str, interval_secs: u64) -> Self {
        Self {
            device_id: device_id.to_string(),
            interval_secs,
            qos: QualityOfService::AtLeastOnce,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// # Errors
    ///
    /// Returns an error if the device id is not a valid client id.
    pub fn identity(&self, kind: DeviceKind) -> Result<DeviceIdentity, ConfigError> {
        DeviceIdentity::parse(&self.device_id, kind).map_err(|err| {
            ConfigError::Validation(format!("{kind} device id {:?}: {err}", self.device_id))
        })
    }
}

impl ListenerConfig {
    /// # Errors
    ///
    /// Returns an error if the device id is not a valid client id.
    pub fn identity(&self) -> Result<DeviceIdentity, ConfigError> {
        DeviceIdentity::parse(&self.device_id, DeviceKind::ActuatorListener).map_err(|err| {
            ConfigError::Validation(format!("listener device id {:?}: {err}", self.device_id))
        })
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            host: session.endpoint_host,
            port: session.endpoint_port,
            durable: session.durable,
            keep_alive_secs: session.keep_alive_secs,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            door: SensorConfig::with_defaults("door-1", 3),
            window: SensorConfig::with_defaults("window-1", 3),
            motion: SensorConfig::with_defaults("motion-1", 2),
            listener: ListenerConfig::default(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self::with_defaults("sensor-1", 3)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            device_id: "actuator-listener".to_string(),
            qos: QualityOfService::AtLeastOnce,
        }
    }
}

impl Default for SimulateConfig {
    fn default() -> Self {
        Self {
            command_interval_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "homesecd=info,homesec=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
