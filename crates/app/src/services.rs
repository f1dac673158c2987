//! Application services — use-case implementations.
//!
//! Each service accepts port trait implementations via generic parameters,
//! keeping this layer decoupled from the concrete transport.

pub mod device;
pub mod dispatcher;
pub mod publisher;
