//! kettle-engine library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # Layout
//!
//! ```text
//! engine            KettleEngine: discover → connect → commands → shutdown
//!  ├─ application   device state, command gating (no sockets)
//!  └─ infrastructure
//!       ├─ network  UDP discovery, TCP session, keep-alive task
//!       └─ storage  TOML configuration
//! ```

pub mod application;
pub mod engine;
pub mod infrastructure;

pub use application::device_state::{DeviceSnapshot, DeviceState, LinkState, RejectionCategory};
pub use engine::{EngineError, KettleEngine};
pub use infrastructure::storage::config::EngineConfig;
