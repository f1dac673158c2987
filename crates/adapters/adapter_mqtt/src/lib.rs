//! # homesec-adapter-mqtt
//!
//! MQTT adapter — connects simulated devices to a broker via `rumqttc`.
//!
//! ## Responsibilities
//! - Build `rumqttc` options from a device identity and session config
//! - Wait for the broker handshake before handing out a session
//! - Drive the event loop on a dedicated task, forwarding inbound publishes
//! - Apply the reconnect policy when the link drops
//! - Disconnect gracefully and join the event-loop task on close
//!
//! ## Dependency rule
//! Same as other adapters: depends on `homesec-app` and `homesec-domain`.

pub mod config;
pub mod error;
mod driver;
mod options;
mod session;

pub use config::MqttConfig;
pub use error::MqttError;
pub use session::{MqttSession, MqttSessionFactory};
