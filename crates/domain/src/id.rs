//! Device identifier — the unique client name a session presents to the bus.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ValidationError;

/// Longest string the MQTT wire format can carry.
const MAX_LEN: usize = u16::MAX as usize;

/// Unique identifier of a simulated device.
///
/// Used verbatim as the bus client identifier, so it must be unique among
/// all sessions connected to the same broker at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Validate and wrap a device id.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the id is empty, too long, or contains
    /// whitespace or a topic wildcard character.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::EmptyDeviceId);
        }
        if value.len() > MAX_LEN {
            return Err(ValidationError::DeviceIdTooLong(value.len()));
        }
        if let Some(bad) = value
            .chars()
            .find(|c| c.is_whitespace() || matches!(c, '+' | '#'))
        {
            return Err(ValidationError::InvalidDeviceIdChar(bad));
        }
        Ok(Self(value))
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
