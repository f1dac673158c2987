//! Device runner — drives one device session through its lifecycle.
//!
//! `Disconnected → Connecting → Connected → Publishing | Listening →
//! Disconnecting → Disconnected`, with a direct edge back to `Disconnected`
//! when the link is lost. Every move goes through
//! [`SessionState::transition`] and is published on a `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use homesec_domain::device::DeviceIdentity;
use homesec_domain::error::HomeSecError;
use homesec_domain::session::{SessionConfig, SessionState};

use super::dispatcher::{DispatchReport, Dispatcher};
use super::publisher::{Publisher, PublisherReport};
use crate::ports::{BusSession, SessionFactory, SessionObserver};

/// Default time allowed for a graceful disconnect.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// What a device does once connected.
#[derive(Debug)]
pub enum DeviceRole {
    Publisher(Publisher),
    Listener(Dispatcher),
}

/// How a device finished after a clean stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOutcome {
    Published(PublisherReport),
    Dispatched(DispatchReport),
}

/// Runs a single device against sessions built by `F`.
pub struct DeviceRunner<F> {
    factory: F,
    config: SessionConfig,
    observer: Arc<dyn SessionObserver>,
    grace: Duration,
    state: watch::Sender<SessionState>,
}

impl<F: SessionFactory> DeviceRunner<F> {
    /// Create a runner starting in [`SessionState::Disconnected`].
    pub fn new(factory: F, config: SessionConfig, observer: Arc<dyn SessionObserver>) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            factory,
            config,
            observer,
            grace: DEFAULT_SHUTDOWN_GRACE,
            state,
        }
    }

    /// Bound how long closing the session may take.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Observe lifecycle state changes.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn advance(&self, identity: &DeviceIdentity, next: SessionState) -> Result<(), HomeSecError> {
        let current = *self.state.borrow();
        let next = current.transition(next)?;
        self.state.send_replace(next);
        if current.is_connected() && next == SessionState::Disconnected {
            tracing::warn!(
                device_id = %identity.device_id,
                from = %current,
                "session lost without a graceful close"
            );
        } else {
            tracing::debug!(
                device_id = %identity.device_id,
                from = %current,
                to = %next,
                "session state changed"
            );
        }
        Ok(())
    }

    /// Connect, run `role` until `cancel` fires or the session fails, then
    /// close the session.
    ///
    /// # Errors
    ///
    /// Returns [`HomeSecError::Connection`] if the session cannot be created,
    /// [`HomeSecError::UnexpectedDisconnect`] if it is lost for good, or any
    /// other error raised by the role.
    pub async fn run(
        self,
        identity: DeviceIdentity,
        role: DeviceRole,
        cancel: CancellationToken,
    ) -> Result<DeviceOutcome, HomeSecError> {
        self.advance(&identity, SessionState::Connecting)?;
        let mut session = match self
            .factory
            .create_session(identity.clone(), &self.config, self.observer.clone())
            .await
        {
            Ok(session) => session,
            Err(err) => {
                tracing::error!(
                    device_id = %identity.device_id,
                    endpoint = %self.config.endpoint(),
                    error = %err,
                    "unable to connect"
                );
                self.advance(&identity, SessionState::Disconnected)?;
                return Err(err);
            }
        };
        self.advance(&identity, SessionState::Connected)?;

        let result = match role {
            DeviceRole::Publisher(publisher) => {
                self.advance(&identity, SessionState::Publishing)?;
                publisher
                    .run(&session, cancel)
                    .await
                    .map(DeviceOutcome::Published)
            }
            DeviceRole::Listener(dispatcher) => {
                self.advance(&identity, SessionState::Listening)?;
                match dispatcher.subscribe_all(&session).await {
                    Ok(()) => dispatcher
                        .run(&mut session, cancel)
                        .await
                        .map(DeviceOutcome::Dispatched),
                    Err(err) => Err(err),
                }
            }
        };

        if matches!(result, Err(HomeSecError::UnexpectedDisconnect(_))) {
            self.advance(&identity, SessionState::Disconnected)?;
            self.release(&identity, session).await;
        } else {
            self.advance(&identity, SessionState::Disconnecting)?;
            self.release(&identity, session).await;
            self.advance(&identity, SessionState::Disconnected)?;
        }
        result
    }

    async fn release(&self, identity: &DeviceIdentity, session: F::Session) {
        match tokio::time::timeout(self.grace, session.close()).await {
            Ok(Ok(())) => {
                tracing::debug!(device_id = %identity.device_id, "session closed");
            }
            Ok(Err(err)) => {
                tracing::warn!(
                    device_id = %identity.device_id,
                    error = %err,
                    "session did not close cleanly"
                );
            }
            Err(_elapsed) => {
                tracing::warn!(
                    device_id = %identity.device_id,
                    grace_ms = self.grace.as_millis(),
                    "session close exceeded grace period"
                );
            }
        }
    }
}
