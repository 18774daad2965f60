#![deny(unsafe_code)]

//! Shared test utilities for the iscsi-command workspace.
//!
//! Provides config builders, tracing helpers, a scripted command runner,
//! fake `iscsi-ls` executables and an in-process server so that individual
//! crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! iscsi-command-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod fixtures;
pub mod runner;
pub mod server;
pub mod tracing_setup;
