//! Delivery guarantee levels.

use std::fmt;

use serde::Deserialize;

use crate::error::ValidationError;

/// Quality of service for a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(try_from = "u8")]
pub enum QualityOfService {
    /// 0: fire and forget.
    AtMostOnce,
    /// 1: acknowledged, duplicates possible.
    #[default]
    AtLeastOnce,
    /// 2: four-way handshake, delivered once.
    ExactlyOnce,
}

impl QualityOfService {
    /// Numeric level as used on the wire.
    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }

    /// Whether the broker keeps this message for an offline durable session.
    #[must_use]
    pub fn is_acknowledged(self) -> bool {
        self >= Self::AtLeastOnce
    }
}

impl TryFrom<u8> for QualityOfService {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(ValidationError::InvalidQos(other)),
        }
    }
}

impl fmt::Display for QualityOfService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_valid_levels() {
        assert_eq!(
            QualityOfService::try_from(0),
            Ok(QualityOfService::AtMostOnce)
        );
        assert_eq!(
            QualityOfService::try_from(1),
            Ok(QualityOfService::AtLeastOnce)
        );
        assert_eq!(
            QualityOfService::try_from(2),
            Ok(QualityOfService::ExactlyOnce)
        );
    }

    #[test]
    fn should_reject_level_three() {
        assert_eq!(
            QualityOfService::try_from(3),
            Err(ValidationError::InvalidQos(3))
        );
    }

    #[test]
    fn should_order_by_strength() {
        assert!(QualityOfService::AtMostOnce < QualityOfService::AtLeastOnce);
        assert_eq!(
            QualityOfService::ExactlyOnce.min(QualityOfService::AtLeastOnce),
            QualityOfService::AtLeastOnce
        );
    }

    #[test]
    fn should_only_acknowledge_qos_one_and_above() {
        assert!(!QualityOfService::AtMostOnce.is_acknowledged());
        assert!(QualityOfService::AtLeastOnce.is_acknowledged());
        assert!(QualityOfService::ExactlyOnce.is_acknowledged());
    }

    #[test]
    fn should_default_to_at_least_once() {
        assert_eq!(QualityOfService::default(), QualityOfService::AtLeastOnce);
    }
}
