//! Connection-string configuration for the docstore engine (§4.11, §6.4).
//!
//! The engine is opened from a single options value carrying a
//! `key=value;key=value` connection string, the way an ADO.NET-style SQLite
//! provider is configured. [`EngineOptions`] parses that string and layers
//! environment-variable overrides on top via `figment`, the same way the
//! reference config crate layers file and environment sources over a typed
//! struct.

pub mod options;

pub use options::{CacheMode, ConfigError, EngineMode, EngineOptions, Result};
