#![deny(unsafe_code)]

//! iscsi-command core runtime.
//!
//! Turns structured discovery requests into `iscsi-ls` invocations, maps the
//! tool's JSON output to LUN records, and serves the result over a Unix
//! domain socket. The binary in `iscsi-command-cli` is a thin shell around
//! [`Daemon`] and [`IpcClient`].

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future for async trait methods that
/// are used through `dyn Trait` (see [`runner::CommandRunner`]).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Per-call cancellation and deadlines.
pub mod context;
/// Server process lifecycle.
pub mod daemon;
/// Unix-socket RPC: wire types, server, client.
pub mod ipc;
/// Recording `tracing` layer.
pub mod logging;
/// Subprocess execution seam.
pub mod runner;
/// Request validation, argv construction and output mapping.
pub mod translator;

pub use context::{CallContext, CancelHandle, ContextError};
pub use daemon::{Daemon, ShutdownSignal};
pub use ipc::{CommandRequest, CommandResponse, IpcClient, IpcClientError, LunInfo};
pub use logging::{LogCollector, LogReader};
pub use runner::{CommandRunner, Invocation, ProcessRunner, RunError};
pub use translator::{CommandTranslator, TranslateError};
