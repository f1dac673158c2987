//! Value domains — the fixed set of payload tokens each device kind may send.
//!
//! Every token travels on the bus as plain UTF-8 text (`OPEN`, `NO_MOTION`,
//! `ON`, …). Parsing is exact and case-sensitive.

use std::fmt;
use std::str::FromStr;

/// Position reported by a door or window contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactState {
    Open,
    Closed,
}

/// Presence reported by a motion detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionState {
    Motion,
    NoMotion,
}

/// Command sent to an actuator (alarm siren, light).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchState {
    On,
    Off,
}

/// Any value a device may put on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateValue {
    Contact(ContactState),
    Motion(MotionState),
    Switch(SwitchState),
}

impl StateValue {
    /// Door and window domain.
    pub const CONTACT: &'static [Self] = &[
        Self::Contact(ContactState::Open),
        Self::Contact(ContactState::Closed),
    ];

    /// Motion detector domain.
    pub const MOTION: &'static [Self] = &[
        Self::Motion(MotionState::Motion),
        Self::Motion(MotionState::NoMotion),
    ];

    /// Actuator domain.
    pub const SWITCH: &'static [Self] =
        &[Self::Switch(SwitchState::On), Self::Switch(SwitchState::Off)];

    /// The wire token for this value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contact(ContactState::Open) => "OPEN",
            Self::Contact(ContactState::Closed) => "CLOSED",
            Self::Motion(MotionState::Motion) => "MOTION",
            Self::Motion(MotionState::NoMotion) => "NO_MOTION",
            Self::Switch(SwitchState::On) => "ON",
            Self::Switch(SwitchState::Off) => "OFF",
        }
    }

    /// The payload bytes published for this value.
    #[must_use]
    pub fn as_payload(self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a token is not part of the expected domain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown state token {0:?}")]
pub struct UnknownToken(pub String);

impl FromStr for SwitchState {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            other => Err(UnknownToken(other.to_string())),
        }
    }
}

impl FromStr for ContactState {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            other => Err(UnknownToken(other.to_string())),
        }
    }
}

impl FromStr for MotionState {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MOTION" => Ok(Self::Motion),
            "NO_MOTION" => Ok(Self::NoMotion),
            other => Err(UnknownToken(other.to_string())),
        }
    }
}

impl FromStr for StateValue {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse()
            .map(Self::Contact)
            .or_else(|_| s.parse().map(Self::Motion))
            .or_else(|_| s.parse().map(Self::Switch))
    }
}
