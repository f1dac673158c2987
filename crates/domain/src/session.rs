//! Session configuration and lifecycle state machine.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> {Publishing | Listening}
//!      ^              |             |                 |
//!      |              v             v                 v
//!      +---------- (failure) <- (link lost) ---- Disconnecting
//! ```

use std::fmt;

use serde::Deserialize;

use crate::error::ValidationError;

/// Wire protocol revision spoken to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ProtocolVersion {
    /// MQTT 3.1.1.
    #[default]
    #[serde(rename = "3.1.1")]
    V311,
}

/// How a session connects to the bus.
///
/// Built once at startup and passed explicitly to the session factory; there
/// is no process-wide client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Broker hostname or IP address.
    pub endpoint_host: String,
    /// Broker TCP port.
    pub endpoint_port: u16,
    /// Keep subscriptions and queued messages broker-side across reconnects.
    pub durable: bool,
    /// Protocol revision.
    pub protocol_version: ProtocolVersion,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint_host: "localhost".to_string(),
            endpoint_port: 1883,
            durable: true,
            protocol_version: ProtocolVersion::V311,
            keep_alive_secs: 30,
        }
    }
}

impl SessionConfig {
    /// Return the `host:port` endpoint.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.endpoint_host, self.endpoint_port)
    }
}

/// Where a device session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Publishing,
    Listening,
    Disconnecting,
}

impl SessionState {
    /// Lowercase name used in logs and errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Publishing => "publishing",
            Self::Listening => "listening",
            Self::Disconnecting => "disconnecting",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{
            Connected, Connecting, Disconnected, Disconnecting, Listening, Publishing,
        };

        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected | Disconnected)
                | (Connected, Publishing | Listening | Disconnecting | Disconnected)
                | (Publishing | Listening, Disconnecting | Disconnected)
                | (Disconnecting, Disconnected)
        )
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTransition`] for illegal moves.
    pub fn transition(self, next: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ValidationError::InvalidTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }

    /// Whether the session currently holds a live connection.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Publishing | Self::Listening)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_localhost_1883() {
        let config = SessionConfig::default();
        assert_eq!(config.endpoint(), "localhost:1883");
        assert!(config.durable);
        assert_eq!(config.protocol_version, ProtocolVersion::V311);
    }

    #[test]
    fn should_deserialize_partial_config() {
        let config: SessionConfig = toml::from_str(
            r#"
            endpoint_host = "broker.lan"
            durable = false
            protocol_version = "3.1.1"
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoint(), "broker.lan:1883");
        assert!(!config.durable);
    }

    #[test]
    fn should_reject_unknown_protocol_version() {
        let result: Result<SessionConfig, _> = toml::from_str(r#"protocol_version = "5""#);
        assert!(result.is_err());
    }

    #[test]
    fn should_follow_publisher_happy_path() {
        let state = SessionState::Disconnected
            .transition(SessionState::Connecting)
            .and_then(|s| s.transition(SessionState::Connected))
            .and_then(|s| s.transition(SessionState::Publishing))
            .and_then(|s| s.transition(SessionState::Disconnecting))
            .and_then(|s| s.transition(SessionState::Disconnected));
        assert_eq!(state, Ok(SessionState::Disconnected));
    }

    #[test]
    fn should_allow_unexpected_disconnect_while_listening() {
        assert!(SessionState::Listening.can_transition_to(SessionState::Disconnected));
        assert!(SessionState::Connected.can_transition_to(SessionState::Disconnected));
    }

    #[test]
    fn should_reject_publishing_before_connect() {
        let result = SessionState::Disconnected.transition(SessionState::Publishing);
        assert_eq!(
            result,
            Err(ValidationError::InvalidTransition {
                from: "disconnected",
                to: "publishing",
            })
        );
    }

    #[test]
    fn should_reject_switching_role_mid_session() {
        assert!(!SessionState::Publishing.can_transition_to(SessionState::Listening));
    }

    #[test]
    fn should_report_connected_states() {
        assert!(SessionState::Publishing.is_connected());
        assert!(!SessionState::Connecting.is_connected());
        assert!(!SessionState::Disconnecting.is_connected());
    }
}
