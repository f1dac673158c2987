//! Device — a simulated sensor or listener and the identity it connects with.

use std::fmt;

use crate::error::ValidationError;
use crate::id::DeviceId;
use crate::state::StateValue;
use crate::topic::SecurityTopic;

/// What a simulated device is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Door,
    Window,
    Motion,
    ActuatorListener,
}

impl DeviceKind {
    /// Kinds that publish periodic readings.
    pub const SENSORS: [Self; 3] = [Self::Door, Self::Window, Self::Motion];

    /// Lowercase name used in logs and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Door => "door",
            Self::Window => "window",
            Self::Motion => "motion",
            Self::ActuatorListener => "actuator-listener",
        }
    }

    /// Topic this kind publishes on, if it is a sensor.
    #[must_use]
    pub fn topic(self) -> Option<SecurityTopic> {
        match self {
            Self::Door => Some(SecurityTopic::Door),
            Self::Window => Some(SecurityTopic::Window),
            Self::Motion => Some(SecurityTopic::Motion),
            Self::ActuatorListener => None,
        }
    }

    /// The closed set of values this kind may send or accept.
    #[must_use]
    pub fn value_domain(self) -> &'static [StateValue] {
        match self {
            Self::Door | Self::Window => StateValue::CONTACT,
            Self::Motion => StateValue::MOTION,
            Self::ActuatorListener => StateValue::SWITCH,
        }
    }

    /// Whether `value` belongs to this kind's domain.
    #[must_use]
    pub fn accepts(self, value: StateValue) -> bool {
        self.value_domain().contains(&value)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a session is. Immutable once the session starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub device_id: DeviceId,
    pub kind: DeviceKind,
}

impl DeviceIdentity {
    /// Create an identity from an already-validated id.
    #[must_use]
    pub fn new(device_id: DeviceId, kind: DeviceKind) -> Self {
        Self { device_id, kind }
    }

    /// Validate `device_id` and build the identity.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the id is not a valid client name.
    pub fn parse(device_id: &str, kind: DeviceKind) -> Result<Self, ValidationError> {
        Ok(Self::new(DeviceId::new(device_id)?, kind))
    }

    /// The client name presented to the bus.
    #[must_use]
    pub fn client_id(&self) -> &str {
        self.device_id.as_str()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.device_id, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ContactState, MotionState, SwitchState};

    #[test]
    fn should_map_sensors_to_their_topics() {
        assert_eq!(DeviceKind::Door.topic(), Some(SecurityTopic::Door));
        assert_eq!(DeviceKind::Window.topic(), Some(SecurityTopic::Window));
        assert_eq!(DeviceKind::Motion.topic(), Some(SecurityTopic::Motion));
        assert_eq!(DeviceKind::ActuatorListener.topic(), None);
    }

    #[test]
    fn should_share_contact_domain_between_door_and_window() {
        assert_eq!(
            DeviceKind::Door.value_domain(),
            DeviceKind::Window.value_domain()
        );
        assert!(DeviceKind::Door.accepts(StateValue::Contact(ContactState::Open)));
        assert!(DeviceKind::Window.accepts(StateValue::Contact(ContactState::Closed)));
    }

    #[test]
    fn should_not_accept_values_from_other_domains() {
        assert!(!DeviceKind::Door.accepts(StateValue::Motion(MotionState::Motion)));
        assert!(!DeviceKind::Motion.accepts(StateValue::Switch(SwitchState::On)));
        assert!(!DeviceKind::ActuatorListener.accepts(StateValue::Contact(ContactState::Open)));
    }

    #[test]
    fn should_display_kind_names() {
        let names: Vec<_> = [
            DeviceKind::Door,
            DeviceKind::Window,
            DeviceKind::Motion,
            DeviceKind::ActuatorListener,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(names, ["door", "window", "motion", "actuator-listener"]);
    }

    #[test]
    fn should_use_device_id_as_client_id() {
        let identity = DeviceIdentity::parse("door-1", DeviceKind::Door).unwrap();
        assert_eq!(identity.client_id(), "door-1");
        assert_eq!(identity.to_string(), "door-1 (door)");
    }

    #[test]
    fn should_reject_invalid_identity() {
        let result = DeviceIdentity::parse("", DeviceKind::Motion);
        assert_eq!(result, Err(ValidationError::EmptyDeviceId));
    }
}
