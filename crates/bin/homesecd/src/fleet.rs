//! Device wiring — turns configuration into running device tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use homesec_app::bus::InProcessBus;
use homesec_app::ports::{DisconnectReason, SessionFactory, SessionObserver};
use homesec_app::services::device::{DeviceOutcome, DeviceRole, DeviceRunner};
use homesec_app::services::dispatcher::Dispatcher;
use homesec_app::services::publisher::{Publisher, PublisherSpec};
use homesec_domain::device::{DeviceIdentity, DeviceKind};
use homesec_domain::error::HomeSecError;
use homesec_domain::qos::QualityOfService;
use homesec_domain::session::SessionConfig;
use homesec_domain::state::StateValue;
use homesec_domain::topic::SecurityTopic;

use crate::config::{Config, ConfigError};

/// A device ready to be started.
#[derive(Debug)]
pub struct DeviceLaunch {
    pub identity: DeviceIdentity,
    pub role: DeviceRole,
}

impl DeviceLaunch {
    /// A sensor publishing with the `kind` settings of `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings do not describe a valid sensor.
    pub fn sensor(config: &Config, kind: DeviceKind) -> Result<Self, ConfigError> {
        let sensor = config.sensor(kind).ok_or_else(|| {
            ConfigError::Validation(format!("{kind} does not publish readings"))
        })?;
        let identity = sensor.identity(kind)?;
        let spec = PublisherSpec::for_sensor(identity.clone(), sensor.interval(), sensor.qos)
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        Ok(Self {
            identity,
            role: DeviceRole::Publisher(Publisher::new(spec)),
        })
    }

    /// The actuator listener with the settings of `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener id is invalid.
    pub fn listener(config: &Config) -> Result<Self, ConfigError> {
        let listener = &config.devices.listener;
        Ok(Self {
            identity: listener.identity()?,
            role: DeviceRole::Listener(Dispatcher::actuators(listener.qos)),
        })
    }

    /// Every device: three sensors and the listener.
    ///
    /// # Errors
    ///
    /// Returns the first invalid device setting.
    pub fn all(config: &Config) -> Result<Vec<Self>, ConfigError> {
        let mut launches = DeviceKind::SENSORS
            .into_iter()
            .map(|kind| Self::sensor(config, kind))
            .collect::<Result<Vec<_>, _>>()?;
        launches.push(Self::listener(config)?);
        Ok(launches)
    }
}

/// Link events counted across every device of a fleet.
#[derive(Debug, Default)]
pub struct LinkStats {
    connects: AtomicU64,
    resumed: AtomicU64,
    drops: AtomicU64,
}

impl LinkStats {
    /// Successful handshakes, reconnects included.
    #[must_use]
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    /// Handshakes where the broker still held the durable session.
    #[must_use]
    pub fn resumed(&self) -> u64 {
        self.resumed.load(Ordering::Relaxed)
    }

    /// Disconnects nobody asked for.
    #[must_use]
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

impl SessionObserver for LinkStats {
    fn on_connected(&self, _identity: &DeviceIdentity, session_present: bool) {
        self.connects.fetch_add(1, Ordering::Relaxed);
        if session_present {
            self.resumed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_disconnected(&self, _identity: &DeviceIdentity, reason: &DisconnectReason) {
        if !reason.is_requested() {
            self.drops.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Settings shared by every device of a fleet.
#[derive(Clone)]
pub struct FleetSettings {
    pub session: SessionConfig,
    pub observer: Arc<dyn SessionObserver>,
    pub shutdown_grace: Duration,
}

/// Run `launches` concurrently until `cancel` fires.
///
/// A device that fails cancels the others; the first failure is returned
/// once every device has shut down.
///
/// # Errors
///
/// Returns the first error reported by any device.
pub async fn run_fleet<F>(
    factory: F,
    settings: FleetSettings,
    launches: Vec<DeviceLaunch>,
    cancel: CancellationToken,
) -> Result<Vec<DeviceOutcome>, HomeSecError>
where
    F: SessionFactory + Clone + 'static,
{
    let mut tasks = JoinSet::new();
    for launch in launches {
        let runner = DeviceRunner::new(
            factory.clone(),
            settings.session.clone(),
            Arc::clone(&settings.observer),
        )
        .with_shutdown_grace(settings.shutdown_grace);
        let device_id = launch.identity.device_id.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let result = runner.run(launch.identity, launch.role, cancel).await;
            (device_id, result)
        });
    }

    let mut outcomes = Vec::new();
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let Ok((device_id, result)) = joined else {
            tracing::error!("device task panicked");
            cancel.cancel();
            continue;
        };
        match result {
            Ok(outcome) => {
                tracing::info!(%device_id, ?outcome, "device stopped");
                outcomes.push(outcome);
            }
            Err(err) => {
                tracing::error!(%device_id, error = %err, "device failed");
                cancel.cancel();
                first_error.get_or_insert(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(outcomes),
    }
}

/// Publishes random alarm and light commands on an in-process bus, standing
/// in for a control panel during simulation.
pub async fn emit_commands(
    bus: InProcessBus,
    interval: Duration,
    mut rng: StdRng,
    cancel: CancellationToken,
) -> u64 {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut emitted = 0;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(topic) = SecurityTopic::ACTUATORS.choose(&mut rng) else {
            break;
        };
        let Some(command) = StateValue::SWITCH.choose(&mut rng) else {
            break;
        };
        bus.inject(
            topic.as_str(),
            command.as_payload(),
            QualityOfService::AtLeastOnce,
        );
        emitted += 1;
        tracing::info!(%topic, %command, "command emitted");
    }
    emitted
}

/// Seeded from OS entropy unless a seed is given.
#[must_use]
pub fn command_rng(seed: Option<u64>) -> StdRng {
    seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
}
