//! Request/response types for the sidecar RPC surface.
//!
//! These are serialized as JSON over the Unix domain socket. Field names
//! follow the established wire contract (`initiatorName`, `targetIQN`, ...).

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The only command the sidecar knows how to run.
pub const ISCSI_LS: &str = "iscsi-ls";

/// Header carrying the caller's deadline in milliseconds.
pub const TIMEOUT_HEADER: &str = "x-request-timeout-ms";

/// Discovery request. Every field is caller-supplied and untrusted.
///
/// Credentials are wiped from memory when the request is dropped.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    // Per-field defaults: a container-level default would move fields out
    // of a value that implements `Drop`.
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub portal: String,
    #[serde(default)]
    pub initiator_name: String,
    #[serde(default, rename = "targetIQN")]
    pub target_iqn: String,
    #[serde(default)]
    pub auth_login: String,
    #[serde(default)]
    pub auth_password: String,
}

impl CommandRequest {
    /// An `iscsi-ls` request without credentials.
    pub fn iscsi_ls(
        portal: impl Into<String>,
        initiator_name: impl Into<String>,
        target_iqn: impl Into<String>,
    ) -> Self {
        Self {
            command: ISCSI_LS.to_string(),
            portal: portal.into(),
            initiator_name: initiator_name.into(),
            target_iqn: target_iqn.into(),
            auth_login: String::new(),
            auth_password: String::new(),
        }
    }

    pub fn with_credentials(
        mut self,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auth_login = login.into();
        self.auth_password = password.into();
        self
    }

    /// Credentials are used only when both halves are present.
    pub fn has_credentials(&self) -> bool {
        !self.auth_login.is_empty() && !self.auth_password.is_empty()
    }
}

impl std::fmt::Debug for CommandRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRequest")
            .field("command", &self.command)
            .field("portal", &self.portal)
            .field("initiator_name", &self.initiator_name)
            .field("target_iqn", &self.target_iqn)
            .field("auth_login", &self.auth_login)
            .field("auth_password", &"[REDACTED]")
            .finish()
    }
}

/// One logical unit exposed by the matched target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LunInfo {
    pub lun_id: u32,
    pub size: String,
    pub vendor: String,
    pub product: String,
    pub serial: String,
}

/// Discovery result.
///
/// `error` carries soft failures (unsupported command, tool failed to run).
/// `luns` is filled only when a target matched the requested IQN.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandResponse {
    pub output: String,
    pub error: String,
    pub luns: Vec<LunInfo>,
}

impl CommandResponse {
    pub fn soft_error(error: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: error.into(),
            luns: Vec::new(),
        }
    }
}

/// Health probe response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
    pub version: String,
}

/// Classification of call-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Canceled,
    DeadlineExceeded,
    NotFound,
    InvalidArgument,
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::Canceled => "canceled",
            ErrorCode::DeadlineExceeded => "deadline_exceeded",
            ErrorCode::NotFound => "not_found",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: ErrorCode,
}
