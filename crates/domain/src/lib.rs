//! # homesec-domain
//!
//! Pure domain model for the homesec device simulator.
//!
//! ## Responsibilities
//! - Foundational types: device identifiers, error conventions, timestamps
//! - Define **device kinds** (door, window, motion, actuator listener) and the
//!   fixed value domain each one may publish
//! - Define **readings** (a value bound to its topic and publish time)
//! - Define **topics**, **subscriptions** and **quality of service** levels
//! - Define the **session configuration** and the session lifecycle state machine
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod device;
pub mod qos;
pub mod reading;
pub mod session;
pub mod state;
pub mod topic;
