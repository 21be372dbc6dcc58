//! Device data model shared by the engine and its callers.

pub mod device;
