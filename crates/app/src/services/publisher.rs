//! Publisher loop — the timed synthetic-reading generator shared by every sensor.
//!
//! One loop covers door, window and motion sensors: it is parameterised by
//! the topic and the value domain taken from the device kind.

use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use homesec_domain::device::DeviceIdentity;
use homesec_domain::error::{HomeSecError, ValidationError};
use homesec_domain::qos::QualityOfService;
use homesec_domain::reading::Reading;
use homesec_domain::state::StateValue;
use homesec_domain::time::format_millis;
use homesec_domain::topic::SecurityTopic;

use crate::ports::BusSession;

/// Default upper bound on a single publish attempt.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

/// What a sensor publishes, where, and how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherSpec {
    identity: DeviceIdentity,
    topic: SecurityTopic,
    value_domain: &'static [StateValue],
    interval: Duration,
    qos: QualityOfService,
    publish_timeout: Duration,
}

impl PublisherSpec {
    /// Derive the topic and value domain from the identity's device kind.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotAPublisher`] for kinds without a topic and
    /// [`ValidationError::ZeroInterval`] for a zero interval.
    pub fn for_sensor(
        identity: DeviceIdentity,
        interval: Duration,
        qos: QualityOfService,
    ) -> Result<Self, ValidationError> {
        let kind = identity.kind;
        let topic = kind
            .topic()
            .ok_or(ValidationError::NotAPublisher(kind.as_str()))?;
        if interval.is_zero() {
            return Err(ValidationError::ZeroInterval);
        }
        Ok(Self {
            identity,
            topic,
            value_domain: kind.value_domain(),
            interval,
            qos,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        })
    }

    /// Override how long a single publish may take before the tick is dropped.
    #[must_use]
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    #[must_use]
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    #[must_use]
    pub fn topic(&self) -> SecurityTopic {
        self.topic
    }

    #[must_use]
    pub fn value_domain(&self) -> &'static [StateValue] {
        self.value_domain
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn qos(&self) -> QualityOfService {
        self.qos
    }
}

/// Counters returned when a publisher loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherReport {
    /// Readings handed to the transport.
    pub published: u64,
    /// Ticks dropped because the publish failed or timed out.
    pub dropped: u64,
}

/// A sensor's publish loop.
///
/// Each publisher owns its random source, so concurrently running sensors
/// never share a sequence.
pub struct Publisher<R = StdRng> {
    spec: PublisherSpec,
    rng: R,
}

impl<R> std::fmt::Debug for Publisher<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl Publisher<StdRng> {
    /// Create a publisher seeded from OS entropy.
    #[must_use]
    pub fn new(spec: PublisherSpec) -> Self {
        Self::with_rng(spec, StdRng::from_entropy())
    }

    /// Create a publisher with a fixed seed, for reproducible sequences.
    #[must_use]
    pub fn seeded(spec: PublisherSpec, seed: u64) -> Self {
        Self::with_rng(spec, StdRng::seed_from_u64(seed))
    }
}

impl<R: rand::Rng + Send> Publisher<R> {
    /// Create a publisher drawing values from `rng`.
    pub fn with_rng(spec: PublisherSpec, rng: R) -> Self {
        Self { spec, rng }
    }

    #[must_use]
    pub fn spec(&self) -> &PublisherSpec {
        &self.spec
    }

    /// Draw the next reading uniformly from the value domain.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the configured value domain is empty or does not
    /// match its device kind.
    pub fn next_reading(&mut self) -> Result<Reading, ValidationError> {
        let kind = self.spec.identity.kind;
        let value = self
            .spec
            .value_domain
            .choose(&mut self.rng)
            .copied()
            .ok_or(ValidationError::NotAPublisher(kind.as_str()))?;
        Reading::new(kind, value)
    }

    /// Publish one reading per interval until `cancel` fires.
    ///
    /// The first tick fires immediately. Missed ticks are skipped, never
    /// bursted. A failed or timed-out publish drops that tick only.
    ///
    /// # Errors
    ///
    /// Returns [`HomeSecError::UnexpectedDisconnect`] when the session is lost
    /// for good, or a validation error if a reading cannot be built.
    #[tracing::instrument(
        name = "publisher",
        skip_all,
        fields(device_id = %self.spec.identity.device_id, topic = %self.spec.topic)
    )]
    pub async fn run<S: BusSession>(
        mut self,
        session: &S,
        cancel: CancellationToken,
    ) -> Result<PublisherReport, HomeSecError> {
        let mut report = PublisherReport::default();
        let mut ticker = tokio::time::interval(self.spec.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let reading = self.next_reading()?;
            let attempt = session.publish(reading.topic.as_str(), reading.payload(), self.spec.qos);
            match tokio::time::timeout(self.spec.publish_timeout, attempt).await {
                Ok(Ok(())) => {
                    report.published += 1;
                    tracing::info!(
                        kind = %reading.kind,
                        device_id = %self.spec.identity.device_id,
                        topic = %reading.topic,
                        value = %reading.value,
                        at = %format_millis(reading.timestamp),
                        "reading published"
                    );
                }
                Ok(Err(err)) if err.is_transient() => {
                    report.dropped += 1;
                    tracing::warn!(
                        device_id = %self.spec.identity.device_id,
                        topic = %reading.topic,
                        error = ?err,
                        "publish failed, tick dropped"
                    );
                }
                Ok(Err(err)) => {
                    tracing::error!(
                        device_id = %self.spec.identity.device_id,
                        topic = %reading.topic,
                        error = ?err,
                        "publisher stopping"
                    );
                    return Err(err);
                }
                Err(_elapsed) => {
                    report.dropped += 1;
                    tracing::warn!(
                        device_id = %self.spec.identity.device_id,
                        topic = %reading.topic,
                        timeout_ms = self.spec.publish_timeout.as_millis(),
                        "publish timed out, tick dropped"
                    );
                }
            }
        }

        tracing::info!(
            published = report.published,
            dropped = report.dropped,
            "publisher stopped"
        );
        Ok(report)
    }
}
