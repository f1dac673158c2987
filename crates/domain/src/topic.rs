//! Topics and subscriptions.

use std::fmt;

use crate::qos::QualityOfService;

/// The fixed set of home-security topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityTopic {
    Alarm,
    Light,
    Door,
    Window,
    Motion,
}

impl SecurityTopic {
    /// Every known topic.
    pub const ALL: [Self; 5] = [
        Self::Alarm,
        Self::Light,
        Self::Door,
        Self::Window,
        Self::Motion,
    ];

    /// Actuator command topics.
    pub const ACTUATORS: [Self; 2] = [Self::Alarm, Self::Light];

    /// The topic name on the bus.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alarm => "home/security/alarm",
            Self::Light => "home/security/light",
            Self::Door => "home/security/door",
            Self::Window => "home/security/window",
            Self::Motion => "home/security/motion",
        }
    }
}

impl fmt::Display for SecurityTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A topic filter registered by a session, with its requested QoS.
///
/// Registered once right after connect and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub topic: String,
    pub qos: QualityOfService,
}

impl Subscription {
    /// Subscribe to one of the known security topics.
    #[must_use]
    pub fn new(topic: SecurityTopic, qos: QualityOfService) -> Self {
        Self {
            topic: topic.as_str().to_string(),
            qos,
        }
    }

    /// Whether a message published on `topic` is delivered to this subscription.
    ///
    /// Only exact topic names are matched; the simulator never registers
    /// wildcard filters.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        self.topic == topic
    }
}
