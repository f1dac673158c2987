//! Ready-made [`SessionObserver`] implementations.

use std::sync::Arc;

use homesec_domain::device::DeviceIdentity;

use crate::ports::{DisconnectReason, SessionObserver};

/// Logs every lifecycle notification through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl SessionObserver for LoggingObserver {
    fn on_connected(&self, identity: &DeviceIdentity, session_present: bool) {
        tracing::info!(
            device_id = %identity.device_id,
            kind = %identity.kind,
            session_present,
            "connected to bus"
        );
    }

    fn on_disconnected(&self, identity: &DeviceIdentity, reason: &DisconnectReason) {
        if reason.is_requested() {
            tracing::info!(
                device_id = %identity.device_id,
                kind = %identity.kind,
                %reason,
                "disconnected from bus"
            );
        } else {
            tracing::warn!(
                device_id = %identity.device_id,
                kind = %identity.kind,
                %reason,
                "lost connection to bus"
            );
        }
    }
}

/// Fans notifications out to several observers, in registration order.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl ObserverSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer to the set.
    #[must_use]
    pub fn with(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl SessionObserver for ObserverSet {
    fn on_connected(&self, identity: &DeviceIdentity, session_present: bool) {
        for observer in &self.observers {
            observer.on_connected(identity, session_present);
        }
    }

    fn on_disconnected(&self, identity: &DeviceIdentity, reason: &DisconnectReason) {
        for observer in &self.observers {
            observer.on_disconnected(identity, reason);
        }
    }
}
