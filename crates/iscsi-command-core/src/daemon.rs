//! Sidecar process lifecycle: bind, serve, and shut down on signal.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use iscsi_command_config::AppConfig;

use crate::ipc::server::{self, IpcState, ServeError};
use crate::translator::CommandTranslator;

/// Shutdown signal sent via broadcast channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal;

/// The sidecar server process.
pub struct Daemon {
    config: AppConfig,
    translator: CommandTranslator,
    shutdown_requested: watch::Sender<bool>,
}

impl Daemon {
    /// Daemon running the configured `iscsi-ls` binary.
    pub fn new(config: AppConfig) -> Self {
        let translator = CommandTranslator::with_program(config.iscsi_ls_path.clone());
        Self::with_translator(config, translator)
    }

    pub fn with_translator(config: AppConfig, translator: CommandTranslator) -> Self {
        Self {
            config,
            translator,
            shutdown_requested: watch::Sender::new(false),
        }
    }

    /// Serve until SIGINT, SIGTERM or [`Daemon::shutdown`]. In-flight calls
    /// finish before this returns and the socket file is removed.
    ///
    /// A shutdown requested before `run` is honored as soon as the socket
    /// is bound.
    pub async fn run(&self) -> Result<(), ServeError> {
        let socket_path = PathBuf::from(&self.config.socket_path);
        let listener = server::bind(&socket_path, self.config.socket_mode)?;

        info!(
            socket = %socket_path.display(),
            iscsi_ls = %self.translator.program(),
            version = %crate::build_info::version_string(),
            "iscsi-command server starting"
        );

        let state = Arc::new(IpcState::new(self.translator.clone()));
        let (server_tx, server_rx) = broadcast::channel(1);
        let mut server = tokio::spawn(async move {
            server::serve(listener, &socket_path, state, server_rx).await
        });

        let mut requested = self.shutdown_requested.subscribe();
        tokio::select! {
            result = &mut server => return result?,
            _ = async { requested.wait_for(|stop| *stop).await.is_ok() } => {
                info!("Shutdown signal received, stopping server");
            }
            name = termination_signal() => {
                warn!(signal = name, "Signal received, initiating graceful shutdown");
                self.shutdown();
            }
        }

        let _ = server_tx.send(ShutdownSignal);
        server.await?
    }

    /// Request a graceful shutdown. Sticky: later calls to [`Daemon::run`]
    /// stop right after binding.
    pub fn shutdown(&self) {
        self.shutdown_requested.send_replace(true);
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Resolves on SIGINT or SIGTERM with the signal's name.
async fn termination_signal() -> &'static str {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            None
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = async {
            match terminate.as_mut() {
                Some(stream) => {
                    stream.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        } => "SIGTERM",
    }
}
