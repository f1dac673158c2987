//! End-to-end tests for the device fleet over the in-process bus.
//!
//! Each test wires real publishers, the real dispatcher and the real device
//! runner exactly as `homesecd` does, with an in-memory bus standing in for
//! the broker. No network is used.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use homesec_app::bus::InProcessBus;
use homesec_app::ports::{BusSession, DisconnectReason, SessionFactory, SessionObserver};
use homesec_app::services::device::{DeviceOutcome, DeviceRole};
use homesec_app::services::dispatcher::{ActuatorEvent, DispatchReport, Dispatcher};
use homesec_app::services::publisher::{Publisher, PublisherSpec};
use homesec_domain::device::{DeviceIdentity, DeviceKind};
use homesec_domain::error::HomeSecError;
use homesec_domain::qos::QualityOfService;
use homesec_domain::session::SessionConfig;
use homesec_domain::topic::{SecurityTopic, Subscription};
use homesecd::config::Config;
use homesecd::fleet::{self, DeviceLaunch, FleetSettings};

/// Counts lifecycle notifications per kind.
#[derive(Default)]
struct Tally {
    connected: Mutex<Vec<(String, bool)>>,
    requested_disconnects: Mutex<Vec<String>>,
}

impl SessionObserver for Tally {
    fn on_connected(&self, identity: &DeviceIdentity, session_present: bool) {
        self.connected
            .lock()
            .unwrap()
            .push((identity.client_id().to_string(), session_present));
    }

    fn on_disconnected(&self, identity: &DeviceIdentity, reason: &DisconnectReason) {
        if reason.is_requested() {
            self.requested_disconnects
                .lock()
                .unwrap()
                .push(identity.client_id().to_string());
        }
    }
}

fn settings(observer: Arc<Tally>) -> FleetSettings {
    FleetSettings {
        session: SessionConfig::default(),
        observer,
        shutdown_grace: Duration::from_secs(1),
    }
}

fn door(id: &str, seed: u64) -> DeviceLaunch {
    let identity = DeviceIdentity::parse(id, DeviceKind::Door).unwrap();
    let spec = PublisherSpec::for_sensor(
        identity.clone(),
        Duration::from_secs(1),
        QualityOfService::AtLeastOnce,
    )
    .unwrap();
    DeviceLaunch {
        identity,
        role: DeviceRole::Publisher(Publisher::seeded(spec, seed)),
    }
}

fn cancel_after(cancel: &CancellationToken, after: Duration) {
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        stopper.cancel();
    });
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn should_deliver_door_readings_unchanged_to_a_subscriber() {
    let bus = InProcessBus::new();
    let panel_identity = DeviceIdentity::parse("panel", DeviceKind::ActuatorListener).unwrap();
    let mut panel = bus
        .create_session(
            panel_identity,
            &SessionConfig::default(),
            Arc::new(Tally::default()),
        )
        .await
        .unwrap();
    panel
        .subscribe(&Subscription::new(
            SecurityTopic::Door,
            QualityOfService::AtLeastOnce,
        ))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel_after(&cancel, Duration::from_millis(2_500));
    let outcomes = fleet::run_fleet(
        bus.clone(),
        settings(Arc::new(Tally::default())),
        vec![door("door-1", 1)],
        cancel,
    )
    .await
    .unwrap();

    assert_eq!(outcomes.len(), 1);
    let mut received = Vec::new();
    while let Ok(Some(message)) =
        tokio::time::timeout(Duration::from_millis(10), panel.recv()).await
    {
        received.push(message);
    }
    assert_eq!(received.len(), 3);
    for message in received {
        assert_eq!(message.topic, "home/security/door");
        assert!(message.payload == b"OPEN" || message.payload == b"CLOSED");
        assert_eq!(message.qos, QualityOfService::AtLeastOnce);
    }
}

#[tokio::test(start_paused = true)]
async fn should_connect_many_devices_with_distinct_ids() {
    let bus = InProcessBus::new();
    let tally = Arc::new(Tally::default());
    let launches = (0..32)
        .map(|n| door(&format!("door-{n}"), n))
        .collect::<Vec<_>>();

    let cancel = CancellationToken::new();
    cancel_after(&cancel, Duration::from_millis(500));
    let outcomes = fleet::run_fleet(bus.clone(), settings(tally.clone()), launches, cancel)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 32);
    assert_eq!(tally.connected.lock().unwrap().len(), 32);
    assert_eq!(tally.requested_disconnects.lock().unwrap().len(), 32);
    assert!((0..32).all(|n| !bus.is_connected(&format!("door-{n}"))));
}

#[tokio::test(start_paused = true)]
async fn should_reject_duplicate_device_id() {
    let bus = InProcessBus::new();
    let cancel = CancellationToken::new();
    cancel_after(&cancel, Duration::from_secs(5));

    let result = fleet::run_fleet(
        bus,
        settings(Arc::new(Tally::default())),
        vec![door("door-1", 1), door("door-1", 2)],
        cancel.clone(),
    )
    .await;

    assert!(matches!(result, Err(HomeSecError::Connection(_))));
    assert!(cancel.is_cancelled());
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn should_stop_every_device_within_grace_period_on_cancel() {
    let bus = InProcessBus::new();
    let tally = Arc::new(Tally::default());
    let launches = DeviceLaunch::all(&Config::default()).unwrap();
    let cancel = CancellationToken::new();

    let fleet = tokio::spawn(fleet::run_fleet(
        bus.clone(),
        settings(tally.clone()),
        launches,
        cancel.clone(),
    ));
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(bus.is_connected("door-1"));
    assert!(bus.is_connected("actuator-listener"));

    cancel.cancel();
    let outcomes = tokio::time::timeout(Duration::from_secs(1), fleet)
        .await
        .expect("fleet did not stop within the grace period")
        .unwrap()
        .unwrap();

    assert_eq!(outcomes.len(), 4);
    for id in ["door-1", "window-1", "motion-1", "actuator-listener"] {
        assert!(!bus.is_connected(id), "{id} still connected");
    }
    assert_eq!(tally.requested_disconnects.lock().unwrap().len(), 4);
}

// ---------------------------------------------------------------------------
// Actuator listener
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_receive_commands_queued_while_durable_listener_was_offline() {
    let bus = InProcessBus::new();
    let tally = Arc::new(Tally::default());
    let identity =
        DeviceIdentity::parse("actuator-listener", DeviceKind::ActuatorListener).unwrap();
    let dispatcher = Dispatcher::actuators(QualityOfService::AtLeastOnce);

    let first = bus
        .create_session(identity.clone(), &SessionConfig::default(), tally.clone())
        .await
        .unwrap();
    dispatcher.subscribe_all(&first).await.unwrap();
    first.close().await.unwrap();

    bus.inject("home/security/alarm", b"ON", QualityOfService::AtLeastOnce);
    bus.inject("home/security/light", b"OFF", QualityOfService::AtLeastOnce);
    bus.inject("home/security/light", b"ON", QualityOfService::AtMostOnce);
    assert_eq!(bus.pending_count("actuator-listener"), 2);

    let mut second = bus
        .create_session(identity, &SessionConfig::default(), tally.clone())
        .await
        .unwrap();
    let events = [
        dispatcher.dispatch(&second.recv().await.unwrap()),
        dispatcher.dispatch(&second.recv().await.unwrap()),
    ];

    assert_eq!(
        events,
        [Ok(ActuatorEvent::AlarmActivated), Ok(ActuatorEvent::LightOff)]
    );
    assert_eq!(
        tally.connected.lock().unwrap().as_slice(),
        [
            ("actuator-listener".to_string(), false),
            ("actuator-listener".to_string(), true),
        ]
    );
}

#[tokio::test]
async fn should_count_rejected_commands_without_stopping() {
    let bus = InProcessBus::new();
    let config = Config::default();
    let cancel = CancellationToken::new();

    let fleet = tokio::spawn(fleet::run_fleet(
        bus.clone(),
        settings(Arc::new(Tally::default())),
        vec![DeviceLaunch::listener(&config).unwrap()],
        cancel.clone(),
    ));
    while bus.subscription_count("actuator-listener") < 2 {
        tokio::task::yield_now().await;
    }
    bus.inject("home/security/alarm", b"ON", QualityOfService::AtLeastOnce);
    bus.inject("home/security/alarm", b"BOGUS", QualityOfService::AtLeastOnce);
    bus.inject("home/security/alarm", b"ON", QualityOfService::AtLeastOnce);
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let outcomes = fleet.await.unwrap().unwrap();
    assert_eq!(
        outcomes,
        vec![DeviceOutcome::Dispatched(DispatchReport {
            handled: 2,
            rejected: 1,
        })]
    );
}

// ---------------------------------------------------------------------------
// simulate command
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn should_run_simulation_for_requested_duration() {
    let config = Config::default();
    let cancel = CancellationToken::new();

    let result = homesecd::simulate(&config, Some(Duration::from_secs(12)), cancel.clone()).await;

    assert!(result.is_ok());
    assert!(cancel.is_cancelled());
}
