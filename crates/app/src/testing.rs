//! Test doubles shared by the unit tests of this crate.

use std::sync::Mutex;

use homesec_domain::device::DeviceIdentity;

use crate::ports::{DisconnectReason, SessionObserver};

/// One recorded lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Connected {
        client_id: String,
        session_present: bool,
    },
    Disconnected {
        client_id: String,
        reason: DisconnectReason,
    },
}

/// Observer that remembers everything it was told.
#[derive(Default)]
pub struct RecordingObserver {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingObserver {
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_connected(&self, identity: &DeviceIdentity, session_present: bool) {
        self.seen.lock().unwrap().push(Notification::Connected {
            client_id: identity.client_id().to_string(),
            session_present,
        });
    }

    fn on_disconnected(&self, identity: &DeviceIdentity, reason: &DisconnectReason) {
        self.seen.lock().unwrap().push(Notification::Disconnected {
            client_id: identity.client_id().to_string(),
            reason: reason.clone(),
        });
    }
}
