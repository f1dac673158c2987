//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the transport.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod bus;
pub mod observer;

pub use bus::{BusSession, InboundMessage, SessionFactory};
pub use observer::{DisconnectReason, SessionObserver};
