//! Observer port — session lifecycle notifications.
//!
//! Anything that needs to know when a session comes up or goes down (logging,
//! reconnect bookkeeping, test harnesses) implements [`SessionObserver`] and is
//! handed to the session factory.

use std::fmt;

use homesec_domain::device::DeviceIdentity;

/// Why a session lost its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The session was closed on request.
    Requested,
    /// The network link failed (I/O error, keep-alive timeout, …).
    Network(String),
    /// The broker refused the session after it was established.
    Refused(String),
}

impl DisconnectReason {
    /// Whether the disconnect was initiated locally.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        matches!(self, Self::Requested)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("requested"),
            Self::Network(cause) => write!(f, "network: {cause}"),
            Self::Refused(cause) => write!(f, "refused: {cause}"),
        }
    }
}

/// Receives connect / disconnect notifications for a session.
///
/// Called from the transport's I/O task; implementations must not block.
pub trait SessionObserver: Send + Sync {
    /// The broker accepted the session. `session_present` is `true` when a
    /// durable session was resumed.
    fn on_connected(&self, identity: &DeviceIdentity, session_present: bool);

    /// The session's link went down.
    fn on_disconnected(&self, identity: &DeviceIdentity, reason: &DisconnectReason);
}
