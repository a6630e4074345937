//! Embedded, wire-compatible key-value document store emulator.
//!
//! [`facade::Engine`] is the library entry point: it owns a
//! [`docstore_storage::Store`] and exposes one request/response method per
//! public operation, translating JSON-ish DTOs to and from the typed engine
//! below it. The `docstore` binary (`main.rs`) is a thin `clap` CLI over the
//! same [`facade::Engine`].

pub mod export;
pub mod facade;

pub use facade::{DocstoreError, Engine, Result};
