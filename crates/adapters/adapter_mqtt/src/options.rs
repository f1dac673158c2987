//! Mapping from domain settings to `rumqttc` types.

use std::time::Duration;

use rumqttc::{MqttOptions, QoS};

use homesec_domain::device::DeviceIdentity;
use homesec_domain::qos::QualityOfService;
use homesec_domain::session::SessionConfig;

use crate::config::MqttConfig;

/// Options for one device: the client id is the device id verbatim and a
/// durable session maps to `clean_session = false`.
pub(crate) fn build_options(
    identity: &DeviceIdentity,
    session: &SessionConfig,
    mqtt: &MqttConfig,
) -> MqttOptions {
    let mut options = MqttOptions::new(
        identity.client_id(),
        session.endpoint_host.clone(),
        session.endpoint_port,
    );
    options
        .set_clean_session(!session.durable)
        .set_keep_alive(Duration::from_secs(u64::from(session.keep_alive_secs.max(1))))
        .set_inflight(mqtt.max_inflight.max(1));
    options
}

pub(crate) fn to_mqtt(qos: QualityOfService) -> QoS {
    match qos {
        QualityOfService::AtMostOnce => QoS::AtMostOnce,
        QualityOfService::AtLeastOnce => QoS::AtLeastOnce,
        QualityOfService::ExactlyOnce => QoS::ExactlyOnce,
    }
}

pub(crate) fn from_mqtt(qos: QoS) -> QualityOfService {
    match qos {
        QoS::AtMostOnce => QualityOfService::AtMostOnce,
        QoS::AtLeastOnce => QualityOfService::AtLeastOnce,
        QoS::ExactlyOnce => QualityOfService::ExactlyOnce,
    }
}
