//! MQTT adapter error types.

use std::error::Error as _;
use std::time::Duration;

use homesec_domain::error::{ConnectionError, DisconnectError, HomeSecError, PublishError};

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The network link or the MQTT state machine failed.
    #[error("MQTT connection error")]
    Connection(#[source] rumqttc::ConnectionError),

    /// The broker answered the handshake with a non-success code.
    #[error("broker refused connection: {0:?}")]
    Refused(rumqttc::ConnectReturnCode),

    /// The broker did not answer the handshake in time.
    #[error("no CONNACK within {0:?}")]
    HandshakeTimeout(Duration),

    /// The request could not be handed to the event loop.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),
}

impl MqttError {
    /// Message including the underlying cause, for the domain error's
    /// `reason` field.
    #[must_use]
    pub fn reason(&self) -> String {
        match self.source() {
            Some(source) => format!("{self}: {source}"),
            None => self.to_string(),
        }
    }

    /// Convert a failed connect attempt into a [`HomeSecError::Connection`].
    #[must_use]
    pub fn into_connection(self, client_id: &str, endpoint: &str) -> HomeSecError {
        ConnectionError {
            client_id: client_id.to_string(),
            endpoint: endpoint.to_string(),
            reason: self.reason(),
        }
        .into()
    }

    /// Convert a failed publish or subscribe into a [`HomeSecError::Publish`].
    #[must_use]
    pub fn into_publish(self, topic: &str) -> HomeSecError {
        PublishError {
            topic: topic.to_string(),
            reason: self.reason(),
        }
        .into()
    }

    /// Convert a failure on a lost link into a
    /// [`HomeSecError::UnexpectedDisconnect`].
    #[must_use]
    pub fn into_disconnect(self, client_id: &str) -> HomeSecError {
        DisconnectError {
            client_id: client_id.to_string(),
            reason: self.reason(),
        }
        .into()
    }
}
