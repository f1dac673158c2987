//! # homesec-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that transport adapters implement:
//!   - `SessionFactory` — connect a device identity to the bus
//!   - `BusSession` — publish, subscribe, receive, close
//!   - `SessionObserver` — connect / disconnect notifications
//! - Define the **use-cases**:
//!   - `Publisher` — the timed synthetic-reading loop shared by every sensor
//!   - `Dispatcher` — topic → handler routing for the actuator listener
//!   - `DeviceRunner` — the session lifecycle around either role
//! - Provide **in-process infrastructure** (an in-memory bus) that doesn't need IO
//! - Own the reconnect policy the adapters consult on link loss
//!
//! ## Dependency rule
//! Depends on `homesec-domain` only (plus `tokio` for timers and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod bus;
pub mod observer;
pub mod ports;
pub mod reconnect;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;
