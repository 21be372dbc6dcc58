//! Network infrastructure.
//!
//! # Sub-modules
//!
//! - **`discovery`** – Broadcasts the probe on UDP and waits for the kettle's
//!   reply, or short-circuits when an address is configured.
//!
//! - **`session`** – Owns the TCP connection: serialised writes, the read
//!   loop, and reconnect-after-backoff.  Implements the application layer's
//!   `KettleTransport` trait.
//!
//! - **`keep_alive`** – Sends the keep-alive literal on a fixed period
//!   through whatever socket the session currently holds.

pub mod discovery;
pub mod keep_alive;
pub mod session;
