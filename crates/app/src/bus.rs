//! In-process bus — a broker-less [`SessionFactory`] for tests and local simulation.
//!
//! Behaves like a small MQTT broker held in memory:
//! - a client id can only be connected once at a time
//! - topics are matched exactly
//! - delivery is FIFO per subscriber, at `min(publish QoS, subscription QoS)`
//! - durable clients keep their subscriptions while offline and queue every
//!   QoS ≥ 1 message published in the meantime
//! - non-durable clients are forgotten on disconnect
//! - every per-client queue is bounded: a full live queue drops the new
//!   message, a full offline queue drops its oldest one

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};

use homesec_domain::device::DeviceIdentity;
use homesec_domain::error::{ConnectionError, DisconnectError, HomeSecError};
use homesec_domain::qos::QualityOfService;
use homesec_domain::session::SessionConfig;
use homesec_domain::topic::Subscription;

use crate::ports::{BusSession, DisconnectReason, InboundMessage, SessionFactory, SessionObserver};

/// In-memory message bus shared by every session created from it.
///
/// Cloning is cheap; clones share the same broker state.
#[derive(Clone)]
pub struct InProcessBus {
    broker: Arc<Mutex<Broker>>,
    queue_limit: usize,
}

/// Messages held per client, live or offline, unless configured otherwise.
pub const DEFAULT_QUEUE_LIMIT: usize = 1_024;

#[derive(Default)]
struct Broker {
    clients: HashMap<String, ClientState>,
    next_generation: u64,
}

struct ClientState {
    durable: bool,
    subscriptions: Vec<Subscription>,
    pending: VecDeque<InboundMessage>,
    link: Option<Link>,
}

struct Link {
    generation: u64,
    sender: mpsc::Sender<InboundMessage>,
    identity: DeviceIdentity,
    observer: Arc<dyn SessionObserver>,
}

impl ClientState {
    fn new(durable: bool) -> Self {
        Self {
            durable,
            subscriptions: Vec::new(),
            pending: VecDeque::new(),
            link: None,
        }
    }

    fn deliver(&mut self, message: InboundMessage, limit: usize) {
        if let Some(link) = &self.link {
            match link.sender.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(message)) => {
                    tracing::warn!(
                        client_id = %link.identity.client_id(),
                        topic = %message.topic,
                        limit,
                        "subscriber queue full, message dropped"
                    );
                }
                // receiver already dropped; the session is gone
                Err(TrySendError::Closed(_)) => self.link = None,
            }
            return;
        }
        if !(self.durable && message.qos.is_acknowledged()) {
            return;
        }
        if self.pending.len() >= limit
            && let Some(oldest) = self.pending.pop_front()
        {
            tracing::warn!(
                topic = %oldest.topic,
                limit,
                "offline queue full, oldest message dropped"
            );
        }
        self.pending.push_back(message);
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::with_queue_limit(DEFAULT_QUEUE_LIMIT)
    }
}

impl InProcessBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty bus holding at most `limit` messages per client.
    #[must_use]
    pub fn with_queue_limit(limit: usize) -> Self {
        Self {
            broker: Arc::default(),
            queue_limit: limit.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Broker> {
        self.broker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a message to every matching subscriber, as if a client had
    /// published it.
    pub fn inject(&self, topic: &str, payload: &[u8], qos: QualityOfService) {
        let mut broker = self.lock();
        for client in broker.clients.values_mut() {
            let granted = client
                .subscriptions
                .iter()
                .find(|sub| sub.matches(topic))
                .map(|sub| sub.qos);
            if let Some(granted) = granted {
                client.deliver(
                    InboundMessage::new(topic, payload, qos.min(granted)),
                    self.queue_limit,
                );
            }
        }
    }

    /// Cut a client's link as if the network failed.
    ///
    /// The session's receive stream ends and its observer is told about a
    /// network disconnect. Returns `false` when the client was not connected.
    pub fn drop_connection(&self, client_id: &str) -> bool {
        let link = {
            let mut broker = self.lock();
            let Some(client) = broker.clients.get_mut(client_id) else {
                return false;
            };
            let link = client.link.take();
            if !client.durable {
                broker.clients.remove(client_id);
            }
            link
        };
        match link {
            Some(link) => {
                link.observer.on_disconnected(
                    &link.identity,
                    &DisconnectReason::Network("connection reset".to_string()),
                );
                true
            }
            None => false,
        }
    }

    /// Whether `client_id` currently holds a live session.
    #[must_use]
    pub fn is_connected(&self, client_id: &str) -> bool {
        self.lock()
            .clients
            .get(client_id)
            .is_some_and(|client| client.link.is_some())
    }

    /// Number of messages queued for an offline durable client.
    #[must_use]
    pub fn pending_count(&self, client_id: &str) -> usize {
        self.lock()
            .clients
            .get(client_id)
            .map_or(0, |client| client.pending.len())
    }

    /// Number of subscriptions registered for `client_id`.
    #[must_use]
    pub fn subscription_count(&self, client_id: &str) -> usize {
        self.lock()
            .clients
            .get(client_id)
            .map_or(0, |client| client.subscriptions.len())
    }
}

impl SessionFactory for InProcessBus {
    type Session = InProcessSession;

    async fn create_session(
        &self,
        identity: DeviceIdentity,
        config: &SessionConfig,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<InProcessSession, HomeSecError> {
        let client_id = identity.client_id().to_string();
        let (sender, receiver) = mpsc::channel(self.queue_limit);

        let (generation, session_present) = {
            let mut broker = self.lock();
            let generation = broker.next_generation;
            broker.next_generation += 1;

            let resumed = match broker.clients.get(&client_id) {
                Some(existing) if existing.link.is_some() => {
                    return Err(ConnectionError {
                        client_id,
                        endpoint: config.endpoint(),
                        reason: "client id already connected".to_string(),
                    }
                    .into());
                }
                Some(existing) => existing.durable && config.durable,
                None => false,
            };

            let client = broker
                .clients
                .entry(client_id.clone())
                .and_modify(|existing| {
                    if !resumed {
                        *existing = ClientState::new(config.durable);
                    }
                })
                .or_insert_with(|| ClientState::new(config.durable));

            for message in client.pending.drain(..) {
                // cannot fail: pending never exceeds the channel capacity
                let _ = sender.try_send(message);
            }
            client.link = Some(Link {
                generation,
                sender,
                identity: identity.clone(),
                observer: Arc::clone(&observer),
            });
            (generation, resumed)
        };

        observer.on_connected(&identity, session_present);

        Ok(InProcessSession {
            bus: self.clone(),
            identity,
            generation,
            receiver,
        })
    }
}

/// A session connected to an [`InProcessBus`].
pub struct InProcessSession {
    bus: InProcessBus,
    identity: DeviceIdentity,
    generation: u64,
    receiver: mpsc::Receiver<InboundMessage>,
}

impl InProcessSession {
    fn ensure_live(&self) -> Result<(), HomeSecError> {
        let broker = self.bus.lock();
        let live = broker
            .clients
            .get(self.identity.client_id())
            .and_then(|client| client.link.as_ref())
            .is_some_and(|link| link.generation == self.generation);
        if live {
            Ok(())
        } else {
            Err(DisconnectError {
                client_id: self.identity.client_id().to_string(),
                reason: "session is no longer connected".to_string(),
            }
            .into())
        }
    }

    /// Release this session's link, unless a newer session owns the client id.
    fn detach(&self) -> Option<Link> {
        let mut broker = self.bus.lock();
        let client_id = self.identity.client_id();
        let client = broker.clients.get_mut(client_id)?;
        let owned = client
            .link
            .as_ref()
            .is_some_and(|link| link.generation == self.generation);
        if !owned {
            return None;
        }
        let link = client.link.take();
        if !client.durable {
            broker.clients.remove(client_id);
        }
        link
    }
}

impl BusSession for InProcessSession {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QualityOfService,
    ) -> Result<(), HomeSecError> {
        self.ensure_live()?;
        self.bus.inject(topic, payload, qos);
        Ok(())
    }

    async fn subscribe(&self, subscription: &Subscription) -> Result<(), HomeSecError> {
        self.ensure_live()?;
        let mut broker = self.bus.lock();
        if let Some(client) = broker.clients.get_mut(self.identity.client_id()) {
            client
                .subscriptions
                .retain(|existing| existing.topic != subscription.topic);
            client.subscriptions.push(subscription.clone());
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<InboundMessage> {
        self.receiver.recv().await
    }

    async fn close(self) -> Result<(), HomeSecError> {
        if let Some(link) = self.detach() {
            link.observer
                .on_disconnected(&self.identity, &DisconnectReason::Requested);
        }
        Ok(())
    }
}

impl Drop for InProcessSession {
    fn drop(&mut self) {
        // no-op after close: the link is already detached
        if let Some(link) = self.detach() {
            link.observer.on_disconnected(
                &self.identity,
                &DisconnectReason::Network("session dropped without close".to_string()),
            );
        }
    }
}
