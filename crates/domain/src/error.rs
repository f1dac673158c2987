//! Common error types used across the workspace.
//!
//! Each failure kind has its own typed error; [`HomeSecError`] collects them
//! for propagation across port boundaries. Adapters define their own errors
//! and convert into [`HomeSecError`].

/// Top-level error for every homesec operation.
#[derive(Debug, thiserror::Error)]
pub enum HomeSecError {
    /// A domain invariant was violated.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// The bus endpoint is unreachable or rejected the handshake.
    #[error("connection error")]
    Connection(#[from] ConnectionError),

    /// A single publish attempt failed; transient.
    #[error("publish error")]
    Publish(#[from] PublishError),

    /// An inbound payload could not be decoded.
    #[error("failed to decode payload")]
    Decode(#[from] DecodePayloadError),

    /// The session lost its connection and will not come back.
    #[error("unexpected disconnect")]
    UnexpectedDisconnect(#[from] DisconnectError),
}

impl HomeSecError {
    /// Whether the caller may keep going after this error.
    ///
    /// Publish and decode failures only affect a single message; everything
    /// else ends the session.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Publish(_) | Self::Decode(_))
    }
}

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A device id was empty.
    #[error("device id must not be empty")]
    EmptyDeviceId,

    /// A device id contained a character the bus does not accept.
    #[error("device id contains invalid character {0:?}")]
    InvalidDeviceIdChar(char),

    /// A device id exceeded the protocol's string limit.
    #[error("device id is {0} bytes long, the limit is 65535")]
    DeviceIdTooLong(usize),

    /// A quality-of-service level outside `0..=2`.
    #[error("quality of service must be 0, 1 or 2, got {0}")]
    InvalidQos(u8),

    /// A publish interval of zero.
    #[error("publish interval must be greater than zero")]
    ZeroInterval,

    /// A reading value that does not belong to the device kind's domain.
    #[error("value {value} is not valid for a {kind} device")]
    ValueOutOfDomain {
        /// Device kind the reading was built for.
        kind: &'static str,
        /// Offending value token.
        value: &'static str,
    },

    /// A device kind that has no publish topic (e.g. the actuator listener).
    #[error("{0} devices do not publish readings")]
    NotAPublisher(&'static str),

    /// A session state transition the lifecycle does not allow.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        /// State before the attempted transition.
        from: &'static str,
        /// Requested target state.
        to: &'static str,
    },
}

/// The bus endpoint could not be reached or refused the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot connect {client_id} to {endpoint}: {reason}")]
pub struct ConnectionError {
    /// Client identifier used for the attempt.
    pub client_id: String,
    /// `host:port` of the endpoint.
    pub endpoint: String,
    /// Human-readable cause.
    pub reason: String,
}

/// A publish attempt was not accepted by the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("publish to {topic} failed: {reason}")]
pub struct PublishError {
    /// Destination topic.
    pub topic: String,
    /// Human-readable cause.
    pub reason: String,
}

/// A payload on a subscribed topic could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodePayloadError {
    /// The payload bytes are not UTF-8.
    #[error("payload on {topic} is not valid UTF-8")]
    InvalidUtf8 {
        /// Topic the payload arrived on.
        topic: String,
    },

    /// The payload is text but not one of the expected tokens.
    #[error("unexpected payload {payload:?} on {topic}")]
    UnexpectedValue {
        /// Topic the payload arrived on.
        topic: String,
        /// The received text.
        payload: String,
    },

    /// No handler is registered for the topic.
    #[error("no handler registered for {topic}")]
    UnhandledTopic {
        /// Topic the payload arrived on.
        topic: String,
    },
}

/// The session's connection dropped and the reconnect policy gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{client_id} disconnected: {reason}")]
pub struct DisconnectError {
    /// Client identifier of the lost session.
    pub client_id: String,
    /// Human-readable cause.
    pub reason: String,
}
