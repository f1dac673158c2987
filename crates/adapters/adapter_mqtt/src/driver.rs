//! Event-loop task owned by an [`MqttSession`](crate::MqttSession).
//!
//! Polls the `rumqttc` event loop, forwards inbound publishes, and applies the
//! reconnect policy when the link drops.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, Outgoing, Packet, Publish, SubAck,
    SubscribeReasonCode,
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use homesec_app::ports::{DisconnectReason, InboundMessage, SessionObserver};
use homesec_app::reconnect::ReconnectPolicy;
use homesec_domain::device::DeviceIdentity;
use homesec_domain::topic::Subscription;

use crate::options::{from_mqtt, to_mqtt};

/// Health of the broker link as seen by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkStatus {
    Up,
    Reconnecting,
    /// The reconnect policy gave up. Terminal.
    Lost,
}

/// State shared with the session. The `EventLoop` itself is not `Sync`, so
/// it is handed to [`Driver::run`] separately and never borrowed across an
/// await through `&self`.
pub(crate) struct Driver {
    pub identity: DeviceIdentity,
    pub client: AsyncClient,
    pub inbound: mpsc::Sender<InboundMessage>,
    pub observer: Arc<dyn SessionObserver>,
    pub policy: ReconnectPolicy,
    pub status: watch::Sender<LinkStatus>,
    pub subscriptions: Arc<Mutex<Vec<Subscription>>>,
    pub cancel: CancellationToken,
    pub rejected: Arc<AtomicUsize>,
}

impl Driver {
    pub(crate) async fn run(self, mut eventloop: EventLoop) {
        let mut failures: u32 = 0;
        loop {
            let event = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                event = eventloop.poll() => event,
            };
            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if failures > 0 {
                        failures = 0;
                        self.on_reconnected(ack.session_present);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => self.forward(publish).await,
                Ok(Event::Incoming(Packet::SubAck(ack))) => self.on_suback(&ack),
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    tracing::debug!(device_id = %self.identity.device_id, "disconnect sent");
                    break;
                }
                Ok(_) => {}
                // every client handle is gone; nobody can use this link anymore
                Err(ConnectionError::RequestsDone) => break,
                Err(err) => {
                    failures = failures.saturating_add(1);
                    if !self.on_link_error(&err, failures).await {
                        break;
                    }
                }
            }
        }
        tracing::debug!(device_id = %self.identity.device_id, "event loop stopped");
    }

    async fn forward(&self, publish: Publish) {
        let topic = String::from_utf8_lossy(publish.topic.as_ref()).into_owned();
        let message = InboundMessage::new(
            topic,
            publish.payload.to_vec(),
            from_mqtt(publish.qos),
        );
        if self.inbound.send(message).await.is_err() {
            tracing::debug!(
                device_id = %self.identity.device_id,
                "inbound message dropped, receiver gone"
            );
        }
    }

    fn on_suback(&self, ack: &SubAck) {
        let failures = ack
            .return_codes
            .iter()
            .filter(|code| matches!(code, SubscribeReasonCode::Failure))
            .count();
        if failures == 0 {
            return;
        }
        self.rejected.fetch_add(failures, Ordering::Relaxed);
        tracing::warn!(
            device_id = %self.identity.device_id,
            pkid = ack.pkid,
            failures,
            "subscription rejected by broker"
        );
    }

    /// Returns `false` when the driver should stop.
    async fn on_link_error(&self, err: &ConnectionError, attempt: u32) -> bool {
        if attempt == 1 {
            self.status.send_replace(LinkStatus::Reconnecting);
            self.observer
                .on_disconnected(&self.identity, &disconnect_reason(err));
        }

        let Some(delay) = self.policy.delay_for(attempt) else {
            tracing::error!(
                device_id = %self.identity.device_id,
                attempts = attempt - 1,
                error = %err,
                "giving up on broker"
            );
            self.status.send_replace(LinkStatus::Lost);
            return false;
        };

        tracing::warn!(
            device_id = %self.identity.device_id,
            attempt,
            delay_ms = delay.as_millis(),
            error = %err,
            "broker link lost, reconnecting"
        );
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    fn on_reconnected(&self, session_present: bool) {
        self.status.send_replace(LinkStatus::Up);
        self.observer.on_connected(&self.identity, session_present);
        if session_present {
            return;
        }
        // the broker forgot us: subscriptions have to be registered again
        let subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for subscription in subscriptions {
            if let Err(err) = self
                .client
                .try_subscribe(subscription.topic.clone(), to_mqtt(subscription.qos))
            {
                tracing::warn!(
                    device_id = %self.identity.device_id,
                    topic = %subscription.topic,
                    error = %err,
                    "unable to restore subscription"
                );
            }
        }
    }
}

fn disconnect_reason(err: &ConnectionError) -> DisconnectReason {
    match err {
        ConnectionError::ConnectionRefused(code) => DisconnectReason::Refused(format!("{code:?}")),
        other => DisconnectReason::Network(other.to_string()),
    }
}
