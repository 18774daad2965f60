//! In-process server on a temporary Unix socket.

use std::path::PathBuf;
use std::sync::Arc;

use iscsi_command_core::ShutdownSignal;
use iscsi_command_core::ipc::server::{self, IpcState, ServeError};
use iscsi_command_core::ipc::IpcClient;
use iscsi_command_core::translator::CommandTranslator;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// A running server plus a client connected to it.
///
/// The temp directory holding the socket is deleted when this value is
/// dropped.
pub struct TestServer {
    pub socket_path: PathBuf,
    pub client: IpcClient,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    handle: JoinHandle<Result<(), ServeError>>,
    _temp_dir: TempDir,
}

impl TestServer {
    pub async fn start(translator: CommandTranslator) -> Self {
        Self::with_state(IpcState::new(translator)).await
    }

    pub async fn with_state(state: IpcState) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let socket_path = temp_dir.path().join("iscsi-command.sock");
        let listener = server::bind(&socket_path, 0o700).expect("failed to bind test socket");

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let serve_path = socket_path.clone();
        let state = Arc::new(state);
        let handle = tokio::spawn(async move {
            server::serve(listener, &serve_path, state, shutdown_rx).await
        });

        Self {
            client: IpcClient::new(&socket_path),
            socket_path,
            shutdown_tx,
            handle,
            _temp_dir: temp_dir,
        }
    }

    /// Signal shutdown and wait for the server to finish.
    pub async fn shutdown(self) -> Result<(), ServeError> {
        let _ = self.shutdown_tx.send(ShutdownSignal);
        self.handle.await?
    }
}
