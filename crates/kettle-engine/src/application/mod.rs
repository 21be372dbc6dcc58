//! Application layer: device state and the gated command use case.
//!
//! # What is the "application" layer? (for beginners)
//!
//! This layer decides *whether* to talk to the kettle and *what* to say, but
//! never *how* bytes reach it.  It depends only on the
//! [`transport::KettleTransport`] trait, so the command rules can be tested
//! with an in-memory recording transport instead of a TCP socket.
//!
//! # Sub-modules
//!
//! - **`device_state`** – The single authoritative snapshot (link state plus
//!   last STAT report), published through a `tokio::sync::watch` channel.
//!
//! - **`control`** – Wake / on / off / query, each checked against the cached
//!   snapshot before anything is sent.
//!
//! - **`transport`** – The trait the session implements.

pub mod control;
pub mod device_state;
pub mod transport;
