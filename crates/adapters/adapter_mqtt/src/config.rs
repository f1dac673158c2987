//! MQTT transport tuning.

use std::time::Duration;

use serde::Deserialize;

/// Client-side settings shared by every MQTT session.
///
/// Endpoint, durability and keep-alive are per session and live in
/// [`homesec_domain::session::SessionConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Capacity of the request channel between client and event loop.
    ///
    /// Caps how many publishes can wait for the network at once.
    pub request_capacity: usize,
    /// Maximum number of unacknowledged QoS 1/2 publishes in flight.
    pub max_inflight: u16,
    /// How long to wait for the broker's CONNACK, in seconds.
    pub connect_timeout_secs: u64,
    /// How long `close` waits for the event-loop task, in milliseconds.
    pub shutdown_grace_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            request_capacity: 10,
            max_inflight: 100,
            connect_timeout_secs: 5,
            shutdown_grace_ms: 2_000,
        }
    }
}

impl MqttConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_have_sensible_defaults() {
        let config = MqttConfig::default();
        assert_eq!(config.request_capacity, 10);
        assert_eq!(config.max_inflight, 100);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(2));
    }

    #[test]
    fn should_deserialize_from_toml() {
        let toml = r"
            request_capacity = 64
            max_inflight = 20
            connect_timeout_secs = 10
            shutdown_grace_ms = 500
        ";
        let config: MqttConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.request_capacity, 64);
        assert_eq!(config.max_inflight, 20);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.shutdown_grace(), Duration::from_millis(500));
    }

    #[test]
    fn should_use_defaults_for_missing_fields() {
        let config: MqttConfig = toml::from_str("max_inflight = 5").unwrap();
        assert_eq!(config.max_inflight, 5);
        assert_eq!(config.request_capacity, 10);
        assert_eq!(config.connect_timeout_secs, 5);
    }
}
