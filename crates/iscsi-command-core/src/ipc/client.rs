//! IPC client: talks to the sidecar over its Unix domain socket.
//!
//! Uses `hyper` for HTTP/1.1 over the socket. Call-level failures reported
//! by the server come back as [`IpcClientError::Rpc`] carrying the same
//! [`ErrorCode`] the server classified them with.

use std::path::PathBuf;
use std::time::Duration;

use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tracing::debug;

use super::types::*;

/// Per-call timeout used when the caller does not pick one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Extra time the client waits past the deadline it sent, so the server's
/// own `deadline_exceeded` answer normally arrives first.
const RESPONSE_GRACE: Duration = Duration::from_millis(500);

/// Errors from the IPC client.
#[derive(Debug, thiserror::Error)]
pub enum IpcClientError {
    #[error("failed to connect to socket at {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("sidecar is not running (socket not found at {0})")]
    NotRunning(PathBuf),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("{code}: {message}")]
    Rpc { code: ErrorCode, message: String },
}

impl IpcClientError {
    /// The server-side classification, when the call got that far.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            IpcClientError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Client for the sidecar's Unix socket API.
#[derive(Debug, Clone)]
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Whether the socket file exists (the sidecar is likely running).
    pub fn server_available(&self) -> bool {
        self.socket_path.exists()
    }

    /// Send an HTTP request over the Unix socket and return the response body.
    async fn request(
        &self,
        method: hyper::Method,
        path: &str,
        body: Option<Vec<u8>>,
        timeout: Option<Duration>,
    ) -> Result<Bytes, IpcClientError> {
        if !self.server_available() {
            return Err(IpcClientError::NotRunning(self.socket_path.clone()));
        }

        let stream =
            UnixStream::connect(&self.socket_path)
                .await
                .map_err(|e| IpcClientError::Connect {
                    path: self.socket_path.clone(),
                    source: e,
                })?;

        let (mut sender, conn) =
            hyper::client::conn::http1::handshake::<_, http_body_util::Full<Bytes>>(TokioIo::new(
                stream,
            ))
            .await
            .map_err(|e| IpcClientError::Request(format!("HTTP handshake failed: {e}")))?;

        // Dropping the connection task closes the socket, which the server
        // sees as the caller going away.
        let conn = tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::warn!(error = %e, "IPC connection error");
            }
        });
        let _abort_on_return = AbortOnDrop(conn);

        debug!(%method, path, "IPC request");

        let mut builder = hyper::Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        if let Some(timeout) = timeout {
            builder = builder.header(TIMEOUT_HEADER, timeout.as_millis().to_string());
        }

        let req = builder
            .body(http_body_util::Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| IpcClientError::Request(format!("failed to build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| IpcClientError::Request(format!("request failed: {e}")))?;

        let status = resp.status();

        let resp_body = http_body_util::BodyExt::collect(resp.into_body())
            .await
            .map_err(|e| IpcClientError::Request(format!("failed to read response body: {e}")))?
            .to_bytes();

        if !status.is_success() {
            if let Ok(err) = serde_json::from_slice::<ErrorResponse>(&resp_body) {
                return Err(IpcClientError::Rpc {
                    code: err.code,
                    message: err.error,
                });
            }
            return Err(IpcClientError::Request(format!(
                "unexpected status: {status}"
            )));
        }

        Ok(resp_body)
    }

    // ── Typed API methods ──────────────────────────────────────────────

    /// Run a discovery request, giving the server `timeout` to answer.
    pub async fn execute(
        &self,
        request: &CommandRequest,
        timeout: Duration,
    ) -> Result<CommandResponse, IpcClientError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| IpcClientError::Parse(format!("failed to serialize request: {e}")))?;

        let call = self.request(hyper::Method::POST, "/execute", Some(body), Some(timeout));
        let body = tokio::time::timeout(timeout + RESPONSE_GRACE, call)
            .await
            .map_err(|_| IpcClientError::Rpc {
                code: ErrorCode::DeadlineExceeded,
                message: "context deadline exceeded".to_string(),
            })??;

        serde_json::from_slice(&body).map_err(|e| IpcClientError::Parse(format!("execute: {e}")))
    }

    /// Health probe.
    pub async fn ping(&self) -> Result<PingResponse, IpcClientError> {
        let body = self
            .request(hyper::Method::GET, "/ping", None, None)
            .await?;
        serde_json::from_slice(&body).map_err(|e| IpcClientError::Parse(format!("ping: {e}")))
    }
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
