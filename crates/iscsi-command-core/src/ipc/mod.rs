//! Sidecar RPC over a Unix domain socket.
//!
//! The server exposes an HTTP/JSON API on the socket; the client speaks
//! HTTP/1.1 to it through `hyper`.
//!
//! ```text
//! ┌──────────┐         Unix socket        ┌──────────────┐
//! │  caller  │───────────────────────────▶│  IPC Server  │
//! │ (client) │  HTTP/1.1 + JSON           │  (axum)      │
//! └──────────┘                            └──────┬───────┘
//!                                                │
//!                                         ┌──────▼───────┐
//!                                         │  Translator  │──▶ iscsi-ls
//!                                         └──────────────┘
//! ```

pub mod client;
pub mod server;
pub mod types;

pub use client::{DEFAULT_TIMEOUT, IpcClient, IpcClientError};
pub use server::{IpcState, RpcError, ServeError};
pub use types::*;
