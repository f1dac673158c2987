//! `rumqttc`-backed [`SessionFactory`] and [`BusSession`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rumqttc::{AsyncClient, ConnAck, ConnectReturnCode, Event, EventLoop, Packet};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use homesec_app::ports::{
    BusSession, DisconnectReason, InboundMessage, SessionFactory, SessionObserver,
};
use homesec_app::reconnect::ReconnectPolicy;
use homesec_domain::device::DeviceIdentity;
use homesec_domain::error::{DisconnectError, HomeSecError};
use homesec_domain::qos::QualityOfService;
use homesec_domain::session::SessionConfig;
use homesec_domain::topic::Subscription;

use crate::config::MqttConfig;
use crate::driver::{Driver, LinkStatus};
use crate::error::MqttError;
use crate::options::{build_options, to_mqtt};

/// Connects devices to an MQTT broker.
#[derive(Debug, Clone, Default)]
pub struct MqttSessionFactory {
    config: MqttConfig,
    policy: ReconnectPolicy,
}

impl MqttSessionFactory {
    #[must_use]
    pub fn new(config: MqttConfig, policy: ReconnectPolicy) -> Self {
        Self { config, policy }
    }
}

impl SessionFactory for MqttSessionFactory {
    type Session = MqttSession;

    async fn create_session(
        &self,
        identity: DeviceIdentity,
        config: &SessionConfig,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<MqttSession, HomeSecError> {
        let endpoint = config.endpoint();
        let capacity = self.config.request_capacity.max(1);
        let options = build_options(&identity, config, &self.config);
        let (client, mut eventloop) = AsyncClient::new(options, capacity);

        tracing::debug!(
            device_id = %identity.device_id,
            %endpoint,
            durable = config.durable,
            "connecting to broker"
        );
        let ack = handshake(&mut eventloop, self.config.connect_timeout())
            .await
            .map_err(|err| err.into_connection(identity.client_id(), &endpoint))?;
        observer.on_connected(&identity, ack.session_present);

        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (status_tx, status_rx) = watch::channel(LinkStatus::Up);
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let rejected = Arc::new(AtomicUsize::new(0));

        let driver = Driver {
            identity: identity.clone(),
            client: client.clone(),
            inbound: inbound_tx,
            observer: Arc::clone(&observer),
            policy: self.policy,
            status: status_tx,
            subscriptions: Arc::clone(&subscriptions),
            cancel: cancel.clone(),
            rejected: Arc::clone(&rejected),
        };
        let driver = tokio::spawn(driver.run(eventloop));

        Ok(MqttSession {
            identity,
            client,
            inbound: inbound_rx,
            status: status_rx,
            subscriptions,
            observer,
            cancel,
            driver,
            grace: self.config.shutdown_grace(),
            rejected,
        })
    }
}

/// Poll until the broker answers the CONNECT.
async fn handshake(eventloop: &mut EventLoop, timeout: Duration) -> Result<ConnAck, MqttError> {
    let wait = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack),
                Ok(_) => {}
                Err(rumqttc::ConnectionError::ConnectionRefused(code)) => {
                    return Err(MqttError::Refused(code));
                }
                Err(err) => return Err(MqttError::Connection(err)),
            }
        }
    };
    let ack = tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| MqttError::HandshakeTimeout(timeout))??;
    if ack.code == ConnectReturnCode::Success {
        Ok(ack)
    } else {
        Err(MqttError::Refused(ack.code))
    }
}

/// A device connected to an MQTT broker.
///
/// Dropping the session without [`BusSession::close`] stops the event loop
/// without sending DISCONNECT.
pub struct MqttSession {
    identity: DeviceIdentity,
    client: AsyncClient,
    inbound: mpsc::Receiver<InboundMessage>,
    status: watch::Receiver<LinkStatus>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    observer: Arc<dyn SessionObserver>,
    cancel: CancellationToken,
    driver: JoinHandle<()>,
    grace: Duration,
    rejected: Arc<AtomicUsize>,
}

impl MqttSession {
    fn link_status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    fn ensure_live(&self) -> Result<(), HomeSecError> {
        if self.link_status() == LinkStatus::Lost {
            return Err(DisconnectError {
                client_id: self.identity.client_id().to_string(),
                reason: "reconnect attempts exhausted".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.driver.abort();
    }
}

impl BusSession for MqttSession {
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
        // never waits for room in the request channel
        self.client
            .try_publish(topic, to_mqtt(qos), false, payload.to_vec())
            .map_err(|err| MqttError::Client(err).into_publish(topic))
    }

    async fn subscribe(&self, subscription: &Subscription) -> Result<(), HomeSecError> {
        self.ensure_live()?;
        self.client
            .subscribe(subscription.topic.clone(), to_mqtt(subscription.qos))
            .await
            .map_err(|err| MqttError::Client(err).into_publish(&subscription.topic))?;
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscriptions.retain(|existing| existing.topic != subscription.topic);
        subscriptions.push(subscription.clone());
        Ok(())
    }

    async fn recv(&mut self) -> Option<InboundMessage> {
        self.inbound.recv().await
    }

    async fn close(mut self) -> Result<(), HomeSecError> {
        let status = self.link_status();
        if status == LinkStatus::Up {
            if let Err(err) = self.client.try_disconnect() {
                tracing::debug!(
                    device_id = %self.identity.device_id,
                    error = %err,
                    "unable to queue DISCONNECT"
                );
                self.cancel.cancel();
            }
        } else {
            self.cancel.cancel();
        }

        match tokio::time::timeout(self.grace, &mut self.driver).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(
                    device_id = %self.identity.device_id,
                    error = %err,
                    "event loop task failed"
                );
            }
            Err(_elapsed) => {
                tracing::warn!(
                    device_id = %self.identity.device_id,
                    grace_ms = self.grace.as_millis(),
                    "event loop did not stop in time, aborting"
                );
                self.cancel.cancel();
                self.driver.abort();
            }
        }

        let rejected = self.rejected.load(Ordering::Relaxed);
        if rejected > 0 {
            tracing::warn!(
                device_id = %self.identity.device_id,
                rejected,
                "session ran with rejected subscriptions"
            );
        }
        if status != LinkStatus::Lost {
            self.observer
                .on_disconnected(&self.identity, &DisconnectReason::Requested);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use homesec_domain::device::DeviceKind;
    use homesec_domain::topic::SecurityTopic;

    const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
    const CONNACK_NOT_AUTHORIZED: [u8; 4] = [0x20, 0x02, 0x00, 0x05];
    const DISCONNECT: u8 = 0xE0;
    const SUBSCRIBE: u8 = 0x82;
    const SUBACK_GRANTED_QOS1: u8 = 0x01;
    const SUBACK_FAILURE: u8 = 0x80;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl SessionObserver for Recorder {
        fn on_connected(&self, identity: &DeviceIdentity, session_present: bool) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("connected {identity} present={session_present}"));
        }

        fn on_disconnected(&self, identity: &DeviceIdentity, reason: &DisconnectReason) {
            let kind = match reason {
                DisconnectReason::Requested => "requested",
                DisconnectReason::Network(_) => "network",
                DisconnectReason::Refused(_) => "refused",
            };
            self.seen
                .lock()
                .unwrap()
                .push(format!("disconnected {identity} {kind}"));
        }
    }

    fn door() -> DeviceIdentity {
        DeviceIdentity::parse("door-1", DeviceKind::Door).unwrap()
    }

    fn session_config(port: u16) -> SessionConfig {
        SessionConfig {
            endpoint_host: "127.0.0.1".to_string(),
            endpoint_port: port,
            ..SessionConfig::default()
        }
    }

    fn factory(policy: ReconnectPolicy) -> MqttSessionFactory {
        MqttSessionFactory::new(
            MqttConfig {
                connect_timeout_secs: 1,
                shutdown_grace_ms: 500,
                ..MqttConfig::default()
            },
            policy,
        )
    }

    /// Read one control packet: its first header byte and its body.
    async fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
        let mut header = [0_u8; 1];
        stream.read_exact(&mut header).await.ok()?;
        let mut remaining = 0_usize;
        let mut shift = 0;
        loop {
            let mut byte = [0_u8; 1];
            stream.read_exact(&mut byte).await.ok()?;
            remaining |= usize::from(byte[0] & 0x7F) << shift;
            if byte[0] & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0_u8; remaining];
        stream.read_exact(&mut body).await.ok()?;
        Some((header[0], body))
    }

    /// Accept one client, read its CONNECT and answer with `connack`.
    async fn accept_with(listener: &TcpListener, connack: &[u8]) -> TcpStream {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (kind, _) = read_packet(&mut stream).await.unwrap();
        assert_eq!(kind, 0x10, "expected CONNECT");
        stream.write_all(connack).await.unwrap();
        stream
    }

    /// Read a SUBSCRIBE, answer it with `code` and return the topic filter.
    async fn answer_subscribe(stream: &mut TcpStream, code: u8) -> String {
        let (kind, body) = read_packet(stream).await.unwrap();
        assert_eq!(kind, SUBSCRIBE, "expected SUBSCRIBE");
        let topic_len = usize::from(u16::from_be_bytes([body[2], body[3]]));
        let topic = String::from_utf8(body[4..4 + topic_len].to_vec()).unwrap();
        stream
            .write_all(&[0x90, 0x03, body[0], body[1], code])
            .await
            .unwrap();
        topic
    }

    async fn wait_for_disconnect(stream: &mut TcpStream) {
        while let Some((kind, _)) = read_packet(stream).await {
            if kind == DISCONNECT {
                return;
            }
        }
    }

    fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
        let topic_len = u16::try_from(topic.len()).unwrap();
        let remaining = u8::try_from(2 + topic.len() + payload.len()).unwrap();
        let mut packet = vec![0x30, remaining];
        packet.extend_from_slice(&topic_len.to_be_bytes());
        packet.extend_from_slice(topic.as_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    #[tokio::test]
    async fn should_fail_with_connection_error_when_endpoint_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = factory(ReconnectPolicy::Terminate)
            .create_session(door(), &session_config(port), Arc::new(Recorder::default()))
            .await;

        match result {
            Err(HomeSecError::Connection(err)) => {
                assert_eq!(err.client_id, "door-1");
                assert_eq!(err.endpoint, format!("127.0.0.1:{port}"));
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("connected to a closed port"),
        }
    }

    #[tokio::test]
    async fn should_time_out_when_broker_never_answers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let silent = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let result = factory(ReconnectPolicy::Terminate)
            .create_session(door(), &session_config(port), Arc::new(Recorder::default()))
            .await;

        match result {
            Err(HomeSecError::Connection(err)) => {
                assert_eq!(err.reason, "no CONNACK within 1s");
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("handshake should not complete"),
        }
        silent.abort();
    }

    #[tokio::test]
    async fn should_fail_when_broker_refuses_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = tokio::spawn(async move {
            accept_with(&listener, &CONNACK_NOT_AUTHORIZED).await
        });

        let observer = Arc::new(Recorder::default());
        let result = factory(ReconnectPolicy::Terminate)
            .create_session(door(), &session_config(port), observer.clone())
            .await;

        assert!(matches!(result, Err(HomeSecError::Connection(_))));
        assert!(observer.seen().is_empty());
        drop(broker.await.unwrap());
    }

    #[tokio::test]
    async fn should_connect_receive_and_close_gracefully() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = tokio::spawn(async move {
            let mut stream = accept_with(&listener, &CONNACK_ACCEPTED).await;
            stream
                .write_all(&publish_packet("home/security/alarm", b"ON"))
                .await
                .unwrap();
            // wait for the client's DISCONNECT
            let mut buffer = [0_u8; 256];
            loop {
                let read = stream.read(&mut buffer).await.unwrap();
                if read == 0 {
                    return false;
                }
                if buffer[..read].contains(&DISCONNECT) {
                    return true;
                }
            }
        });

        let observer = Arc::new(Recorder::default());
        let mut session = factory(ReconnectPolicy::Terminate)
            .create_session(door(), &session_config(port), observer.clone())
            .await
            .unwrap();

        let message = session.recv().await.unwrap();
        assert_eq!(message.topic, "home/security/alarm");
        assert_eq!(message.payload, b"ON");
        assert_eq!(message.qos, QualityOfService::AtMostOnce);

        session
            .publish("home/security/door", b"OPEN", QualityOfService::AtMostOnce)
            .await
            .unwrap();
        session.close().await.unwrap();

        assert!(broker.await.unwrap(), "broker never saw DISCONNECT");
        assert_eq!(
            observer.seen(),
            vec![
                "connected door-1 (door) present=false".to_string(),
                "disconnected door-1 (door) requested".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn should_declare_session_lost_when_policy_terminates() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = tokio::spawn(async move {
            let stream = accept_with(&listener, &CONNACK_ACCEPTED).await;
            drop(stream);
            listener
        });

        let observer = Arc::new(Recorder::default());
        let mut session = factory(ReconnectPolicy::Terminate)
            .create_session(door(), &session_config(port), observer.clone())
            .await
            .unwrap();
        let _listener = broker.await.unwrap();

        assert!(session.recv().await.is_none());
        let publish = session
            .publish("home/security/door", b"OPEN", QualityOfService::AtLeastOnce)
            .await;
        assert!(matches!(
            publish,
            Err(HomeSecError::UnexpectedDisconnect(_))
        ));
        session.close().await.unwrap();
        assert_eq!(
            observer.seen(),
            vec![
                "connected door-1 (door) present=false".to_string(),
                "disconnected door-1 (door) network".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn should_reconnect_and_restore_subscriptions_after_link_loss() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = tokio::spawn(async move {
            let mut topics = Vec::new();
            // the first two links are cut right after the SUBACK
            for _ in 0..2 {
                let mut stream = accept_with(&listener, &CONNACK_ACCEPTED).await;
                topics.push(answer_subscribe(&mut stream, SUBACK_GRANTED_QOS1).await);
            }
            let mut stream = accept_with(&listener, &CONNACK_ACCEPTED).await;
            topics.push(answer_subscribe(&mut stream, SUBACK_GRANTED_QOS1).await);
            stream
                .write_all(&publish_packet("home/security/alarm", b"OFF"))
                .await
                .unwrap();
            wait_for_disconnect(&mut stream).await;
            topics
        });

        // a single attempt per outage: only a counter reset allows the second one
        let policy = ReconnectPolicy::Bounded {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(50),
        };
        let observer = Arc::new(Recorder::default());
        let mut session = factory(policy)
            .create_session(door(), &session_config(port), observer.clone())
            .await
            .unwrap();
        session
            .subscribe(&Subscription::new(
                SecurityTopic::Alarm,
                QualityOfService::AtLeastOnce,
            ))
            .await
            .unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), session.recv())
            .await
            .expect("no message after reconnect")
            .unwrap();
        assert_eq!(message.topic, "home/security/alarm");
        assert_eq!(message.payload, b"OFF");
        assert_eq!(session.link_status(), LinkStatus::Up);

        session.close().await.unwrap();
        assert_eq!(broker.await.unwrap(), vec!["home/security/alarm"; 3]);
        assert_eq!(
            observer.seen(),
            vec![
                "connected door-1 (door) present=false".to_string(),
                "disconnected door-1 (door) network".to_string(),
                "connected door-1 (door) present=false".to_string(),
                "disconnected door-1 (door) network".to_string(),
                "connected door-1 (door) present=false".to_string(),
                "disconnected door-1 (door) requested".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn should_record_subscription_rejected_by_broker() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = tokio::spawn(async move {
            let mut stream = accept_with(&listener, &CONNACK_ACCEPTED).await;
            let topic = answer_subscribe(&mut stream, SUBACK_FAILURE).await;
            wait_for_disconnect(&mut stream).await;
            topic
        });

        let session = factory(ReconnectPolicy::Terminate)
            .create_session(
                door(),
                &session_config(port),
                Arc::new(Recorder::default()),
            )
            .await
            .unwrap();
        session
            .subscribe(&Subscription::new(
                SecurityTopic::Light,
                QualityOfService::AtLeastOnce,
            ))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while session.rejected.load(Ordering::Relaxed) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("rejection never recorded");
        assert_eq!(session.rejected.load(Ordering::Relaxed), 1);
        assert_eq!(session.link_status(), LinkStatus::Up);

        session.close().await.unwrap();
        assert_eq!(broker.await.unwrap(), "home/security/light");
    }
}
