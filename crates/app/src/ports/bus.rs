//! Bus port — connect, publish, subscribe and receive over a message bus.
//!
//! A [`SessionFactory`] turns a device identity into a live [`BusSession`].
//! Implementations live in adapter crates (MQTT) or in [`crate::bus`]
//! (in-process).

use std::future::Future;
use std::sync::Arc;

use homesec_domain::device::DeviceIdentity;
use homesec_domain::error::HomeSecError;
use homesec_domain::qos::QualityOfService;
use homesec_domain::session::SessionConfig;
use homesec_domain::topic::Subscription;

use super::observer::SessionObserver;

/// A message delivered to a session by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QualityOfService,
}

impl InboundMessage {
    /// Build a message from a topic and raw payload.
    pub fn new(
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        qos: QualityOfService,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
        }
    }
}

/// One device's connection to the bus.
///
/// Publishing is fire-and-forget from the caller's point of view: a
/// successful return means the message was handed to the transport, not that
/// the broker acknowledged it.
pub trait BusSession: Send + Sync {
    /// The identity this session connected with.
    fn identity(&self) -> &DeviceIdentity;

    /// Hand a message to the transport.
    ///
    /// Returns [`HomeSecError::Publish`] when this attempt could not be
    /// enqueued, and [`HomeSecError::UnexpectedDisconnect`] once the session is
    /// permanently lost.
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QualityOfService,
    ) -> impl Future<Output = Result<(), HomeSecError>> + Send;

    /// Register a subscription for the rest of the session.
    fn subscribe(
        &self,
        subscription: &Subscription,
    ) -> impl Future<Output = Result<(), HomeSecError>> + Send;

    /// Wait for the next inbound message.
    ///
    /// Returns `None` once the session can no longer deliver messages (closed
    /// or permanently lost).
    fn recv(&mut self) -> impl Future<Output = Option<InboundMessage>> + Send;

    /// Disconnect gracefully and release every resource held by the session.
    fn close(self) -> impl Future<Output = Result<(), HomeSecError>> + Send;
}

/// Builds connected sessions. Shared by every publisher and listener.
pub trait SessionFactory: Send + Sync {
    /// The session type produced.
    type Session: BusSession + 'static;

    /// Connect `identity` to the bus described by `config`.
    ///
    /// The factory performs no retries: an unreachable endpoint or a
    /// rejected handshake fails with [`HomeSecError::Connection`] and the
    /// caller decides what to do next. On success `observer` has already
    /// received `on_connected`.
    fn create_session(
        &self,
        identity: DeviceIdentity,
        config: &SessionConfig,
        observer: Arc<dyn SessionObserver>,
    ) -> impl Future<Output = Result<Self::Session, HomeSecError>> + Send;
}

impl<T: SessionFactory> SessionFactory for Arc<T> {
    type Session = T::Session;

    fn create_session(
        &self,
        identity: DeviceIdentity,
        config: &SessionConfig,
        observer: Arc<dyn SessionObserver>,
    ) -> impl Future<Output = Result<Self::Session, HomeSecError>> + Send {
        (**self).create_session(identity, config, observer)
    }
}
