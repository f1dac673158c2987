//! Subscriber dispatcher — routes inbound actuator commands to their handlers.

use std::collections::HashMap;
use std::fmt;

use tokio_util::sync::CancellationToken;

use homesec_domain::error::{DecodePayloadError, DisconnectError, HomeSecError};
use homesec_domain::qos::QualityOfService;
use homesec_domain::state::{StateValue, SwitchState};
use homesec_domain::topic::{SecurityTopic, Subscription};

use crate::ports::{BusSession, InboundMessage};

/// Outcome of a decoded actuator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorEvent {
    AlarmActivated,
    AlarmDeactivated,
    LightOn,
    LightOff,
}

impl ActuatorEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlarmActivated => "alarm activated",
            Self::AlarmDeactivated => "alarm deactivated",
            Self::LightOn => "light turned on",
            Self::LightOff => "light turned off",
        }
    }

    /// Operator-facing announcement printed by the listener.
    #[must_use]
    pub fn announcement(self) -> &'static str {
        match self {
            Self::AlarmActivated => "🚨 Alarm Activated!",
            Self::AlarmDeactivated => "🚨 Alarm Deactivated!",
            Self::LightOn => "💡 Light Turned ON!",
            Self::LightOff => "💡 Light Turned OFF!",
        }
    }
}

impl fmt::Display for ActuatorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decodes the payload of one topic into an [`ActuatorEvent`].
///
/// Handlers must be pure: the same payload always yields the same result.
pub trait MessageHandler: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`DecodePayloadError`] if the payload is not a valid command.
    fn handle(&self, topic: &str, payload: &[u8]) -> Result<ActuatorEvent, DecodePayloadError>;
}

fn decode_switch(topic: &str, payload: &[u8]) -> Result<SwitchState, DecodePayloadError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodePayloadError::InvalidUtf8 {
        topic: topic.to_string(),
    })?;
    match text.parse::<StateValue>() {
        Ok(StateValue::Switch(state)) => Ok(state),
        _ => Err(DecodePayloadError::UnexpectedValue {
            topic: topic.to_string(),
            payload: text.to_string(),
        }),
    }
}

/// `ON` activates the alarm, `OFF` deactivates it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlarmHandler;

impl MessageHandler for AlarmHandler {
    fn handle(&self, topic: &str, payload: &[u8]) -> Result<ActuatorEvent, DecodePayloadError> {
        Ok(match decode_switch(topic, payload)? {
            SwitchState::On => ActuatorEvent::AlarmActivated,
            SwitchState::Off => ActuatorEvent::AlarmDeactivated,
        })
    }
}

/// `ON` turns the light on, `OFF` turns it off.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightHandler;

impl MessageHandler for LightHandler {
    fn handle(&self, topic: &str, payload: &[u8]) -> Result<ActuatorEvent, DecodePayloadError> {
        Ok(match decode_switch(topic, payload)? {
            SwitchState::On => ActuatorEvent::LightOn,
            SwitchState::Off => ActuatorEvent::LightOff,
        })
    }
}

/// Counters returned when a dispatch loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Messages turned into an event.
    pub handled: u64,
    /// Messages dropped because they could not be decoded or routed.
    pub rejected: u64,
}

/// Topic → handler table.
pub struct Dispatcher {
    handlers: HashMap<String, Box<dyn MessageHandler>>,
    qos: QualityOfService,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut topics: Vec<_> = self.handlers.keys().collect();
        topics.sort();
        f.debug_struct("Dispatcher")
            .field("topics", &topics)
            .field("qos", &self.qos)
            .finish()
    }
}

impl Dispatcher {
    /// Create an empty table whose subscriptions use `qos`.
    #[must_use]
    pub fn new(qos: QualityOfService) -> Self {
        Self {
            handlers: HashMap::new(),
            qos,
        }
    }

    /// The actuator listener table: alarm and light.
    #[must_use]
    pub fn actuators(qos: QualityOfService) -> Self {
        Self::new(qos)
            .register(SecurityTopic::Alarm, AlarmHandler)
            .register(SecurityTopic::Light, LightHandler)
    }

    /// Route `topic` to `handler`, replacing any previous handler.
    #[must_use]
    pub fn register(mut self, topic: SecurityTopic, handler: impl MessageHandler + 'static) -> Self {
        self.handlers
            .insert(topic.as_str().to_string(), Box::new(handler));
        self
    }

    #[must_use]
    pub fn qos(&self) -> QualityOfService {
        self.qos
    }

    /// One subscription per registered topic, sorted by topic.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let mut subscriptions: Vec<_> = self
            .handlers
            .keys()
            .map(|topic| Subscription {
                topic: topic.clone(),
                qos: self.qos,
            })
            .collect();
        subscriptions.sort_by(|a, b| a.topic.cmp(&b.topic));
        subscriptions
    }

    /// Decode a single message.
    ///
    /// # Errors
    ///
    /// Returns [`DecodePayloadError::UnhandledTopic`] when no handler is
    /// registered for the topic, or the handler's own decode error.
    pub fn dispatch(&self, message: &InboundMessage) -> Result<ActuatorEvent, DecodePayloadError> {
        let handler = self.handlers.get(&message.topic).ok_or_else(|| {
            DecodePayloadError::UnhandledTopic {
                topic: message.topic.clone(),
            }
        })?;
        handler.handle(&message.topic, &message.payload)
    }

    /// Register every subscription of the table on `session`.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the session.
    pub async fn subscribe_all<S: BusSession>(&self, session: &S) -> Result<(), HomeSecError> {
        for subscription in self.subscriptions() {
            session.subscribe(&subscription).await?;
            tracing::debug!(
                device_id = %session.identity().device_id,
                topic = %subscription.topic,
                qos = %subscription.qos,
                "subscribed"
            );
        }
        Ok(())
    }

    /// Dispatch inbound messages in delivery order until `cancel` fires.
    ///
    /// Subscriptions must already be registered (see [`Self::subscribe_all`]).
    ///
    /// # Errors
    ///
    /// Returns [`HomeSecError::UnexpectedDisconnect`] if the session stops
    /// delivering before cancellation.
    #[tracing::instrument(
        name = "dispatcher",
        skip_all,
        fields(device_id = %session.identity().device_id)
    )]
    pub async fn run<S: BusSession>(
        &self,
        session: &mut S,
        cancel: CancellationToken,
    ) -> Result<DispatchReport, HomeSecError> {
        let mut report = DispatchReport::default();
        loop {
            let message = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                message = session.recv() => message,
            };
            let Some(message) = message else {
                return Err(DisconnectError {
                    client_id: session.identity().client_id().to_string(),
                    reason: "inbound stream ended".to_string(),
                }
                .into());
            };
            match self.dispatch(&message) {
                Ok(event) => {
                    report.handled += 1;
                    tracing::info!(
                        device_id = %session.identity().device_id,
                        topic = %message.topic,
                        %event,
                        "{}",
                        event.announcement()
                    );
                }
                Err(err) => {
                    report.rejected += 1;
                    tracing::warn!(
                        device_id = %session.identity().device_id,
                        topic = %message.topic,
                        error = %err,
                        "message dropped"
                    );
                }
            }
        }
        tracing::info!(
            handled = report.handled,
            rejected = report.rejected,
            "dispatcher stopped"
        );
        Ok(report)
    }
}
