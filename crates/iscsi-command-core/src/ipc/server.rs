//! IPC server: axum HTTP router over a Unix domain socket.
//!
//! Exposes `POST /execute` and `GET /ping`. Every call passes through a
//! logging middleware that records the path, HTTP status, outcome and
//! elapsed time.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tracing::{Dispatch, info, warn};

use super::types::*;
use crate::context::CallContext;
use crate::daemon::ShutdownSignal;
use crate::translator::{CommandTranslator, TranslateError};

/// Status reported by `GET /ping`.
pub const PING_STATUS: &str = "Service is running";

/// Errors from binding or running the IPC server.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("failed to remove stale socket at {path}: {source}")]
    Stale {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to listen on Unix socket {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to set permissions on Unix socket {path}: {source}")]
    Permissions {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Shared state accessible to all IPC route handlers.
#[derive(Debug)]
pub struct IpcState {
    pub translator: CommandTranslator,
    pub dispatch: Option<Dispatch>,
}

impl IpcState {
    pub fn new(translator: CommandTranslator) -> Self {
        Self {
            translator,
            dispatch: None,
        }
    }

    /// Route both the request middleware and the translator's events to
    /// `dispatch`.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.translator = self.translator.with_dispatch(dispatch.clone());
        self.dispatch = Some(dispatch);
        self
    }
}

/// A call-level failure rendered as a non-2xx [`ErrorResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<TranslateError> for RpcError {
    fn from(err: TranslateError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            code: self.code,
        };
        (status_for(self.code), Json(body)).into_response()
    }
}

/// HTTP status for each error code. `canceled` uses the non-standard 499
/// "client closed request".
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Canceled => {
            StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT)
        }
        ErrorCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build the axum router with all IPC routes.
pub fn router(state: Arc<IpcState>) -> axum::Router {
    axum::Router::new()
        .route("/execute", post(handle_execute))
        .route("/ping", get(handle_ping))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            log_requests,
        ))
        .with_state(state)
}

/// Remove any stale socket, bind, and apply `mode` to the socket file.
pub fn bind(socket_path: &Path, mode: u32) -> Result<UnixListener, ServeError> {
    remove_stale(socket_path).map_err(|source| ServeError::Stale {
        path: socket_path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let listener = UnixListener::bind(socket_path).map_err(|source| ServeError::Bind {
        path: socket_path.to_path_buf(),
        source,
    })?;

    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(mode)).map_err(
        |source| ServeError::Permissions {
            path: socket_path.to_path_buf(),
            source,
        },
    )?;

    info!(path = %socket_path.display(), mode = %format!("{mode:o}"), "Server is running on Unix socket");
    Ok(listener)
}

/// Serve `listener` until the shutdown signal is received, then remove
/// the socket file. In-flight calls are allowed to finish.
pub async fn serve(
    listener: UnixListener,
    socket_path: &Path,
    state: Arc<IpcState>,
    mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
) -> Result<(), ServeError> {
    let app = router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutting down gracefully...");
        })
        .await?;

    std::fs::remove_file(socket_path).ok();
    info!("Server stopped");
    Ok(())
}

fn remove_stale(path: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

// ── Middleware ──────────────────────────────────────────────────────────

async fn log_requests(State(state): State<Arc<IpcState>>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    with_dispatch(state.dispatch.as_ref(), || {
        info!(method = %method, path = %path, "Received request");
    });

    let response = next.run(request).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    with_dispatch(state.dispatch.as_ref(), || {
        if status.is_success() {
            info!(path = %path, status = status.as_u16(), outcome = "ok", elapsed_ms, "Request completed");
        } else {
            warn!(path = %path, status = status.as_u16(), outcome = "error", elapsed_ms, "Request failed");
        }
    });

    response
}

fn with_dispatch(dispatch: Option<&Dispatch>, f: impl FnOnce()) {
    match dispatch {
        Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
        None => f(),
    }
}

// ── Route handlers ──────────────────────────────────────────────────────

async fn handle_execute(
    State(state): State<Arc<IpcState>>,
    headers: HeaderMap,
    body: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Json<CommandResponse>, RpcError> {
    let Json(request) = body
        .map_err(|rejection| RpcError::new(ErrorCode::InvalidArgument, rejection.body_text()))?;
    let ctx = context_from_headers(&headers)?;

    let response = state.translator.execute(&ctx, &request).await?;
    Ok(Json(response))
}

async fn handle_ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: PING_STATUS.to_string(),
        version: crate::build_info::version_string(),
    })
}

/// Build the call context from the optional deadline header.
fn context_from_headers(headers: &HeaderMap) -> Result<CallContext, RpcError> {
    let Some(value) = headers.get(TIMEOUT_HEADER) else {
        return Ok(CallContext::background());
    };
    let millis = value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| {
            RpcError::new(
                ErrorCode::InvalidArgument,
                format!("invalid {TIMEOUT_HEADER} header: expected milliseconds"),
            )
        })?;
    Ok(CallContext::with_timeout(Duration::from_millis(millis)))
}
