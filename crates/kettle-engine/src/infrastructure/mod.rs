//! Infrastructure layer: sockets, timers, and the configuration file.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `kettle_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
