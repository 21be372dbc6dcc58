//! Storage infrastructure: the TOML configuration file.
//!
//! The `config` sub-module reads [`config::EngineConfig`] from disk and
//! falls back to defaults when no file exists, so a first run needs no
//! setup beyond (optionally) the kettle's address.

pub mod config;
