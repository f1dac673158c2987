//! Reading — one synthetic sensor value, bound to its topic and publish time.

use crate::device::DeviceKind;
use crate::error::ValidationError;
use crate::state::StateValue;
use crate::time::{Timestamp, now};
use crate::topic::SecurityTopic;

/// A value produced by a sensor at one publish tick.
///
/// Readings are transient: built, sent and dropped every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub kind: DeviceKind,
    pub topic: SecurityTopic,
    pub value: StateValue,
    pub timestamp: Timestamp,
}

impl Reading {
    /// Build a reading for a sensor kind, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotAPublisher`] for kinds without a topic and
    /// [`ValidationError::ValueOutOfDomain`] when `value` is not in the kind's
    /// domain.
    pub fn new(kind: DeviceKind, value: StateValue) -> Result<Self, ValidationError> {
        let topic = kind
            .topic()
            .ok_or(ValidationError::NotAPublisher(kind.as_str()))?;
        if !kind.accepts(value) {
            return Err(ValidationError::ValueOutOfDomain {
                kind: kind.as_str(),
                value: value.as_str(),
            });
        }
        Ok(Self {
            kind,
            topic,
            value,
            timestamp: now(),
        })
    }

    /// Payload bytes to put on the bus.
    #[must_use]
    pub fn payload(&self) -> &'static [u8] {
        self.value.as_payload()
    }
}
