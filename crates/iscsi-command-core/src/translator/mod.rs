//! Command translation: one [`CommandRequest`] in, one [`CommandResponse`]
//! (or a call-level [`TranslateError`]) out, using exactly one subprocess.
//!
//! ## Outcomes
//!
//! ```text
//! Validating ─▶ BuildingCommand ─▶ Executing ─┬─▶ Canceled        (error)
//!     │                                       ├─▶ TimedOut        (error)
//!     │                                       ├─▶ ExecFailed      (soft)
//!     ▼                                       └─▶ Parsing ─┬─▶ ParseFailed (error)
//!  Unsupported (soft)                                      ├─▶ NoMatch     (error)
//!                                                          └─▶ Matched
//! ```
//!
//! Soft failures come back as a normal response with `error` set; the
//! others are call-level errors. Callers rely on this split to tell a
//! broken service apart from a discovery attempt that failed.

pub mod output;
pub mod target;

use std::sync::Arc;

use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument, error, info, info_span, warn};

use crate::context::{CallContext, ContextError};
use crate::ipc::types::{CommandRequest, CommandResponse, ErrorCode, ISCSI_LS};
use crate::runner::{CommandRunner, ProcessRunner};

pub use output::{ToolLun, ToolTarget, luns_for_target, parse_targets};
pub use target::{TargetUrl, build_invocation};

/// Soft error returned for any command other than `iscsi-ls`.
pub const UNSUPPORTED_COMMAND: &str = "Unsupported command";

/// Call-level failures of [`CommandTranslator::execute`].
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("command canceled: {}", ContextError::Canceled)]
    Canceled,

    #[error("command timed out: {}", ContextError::DeadlineExceeded)]
    DeadlineExceeded,

    #[error("failed to parse iscsi-ls output: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("no LUNs found for target {0}")]
    NoMatch(String),
}

impl TranslateError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TranslateError::Canceled => ErrorCode::Canceled,
            TranslateError::DeadlineExceeded => ErrorCode::DeadlineExceeded,
            TranslateError::Parse(_) => ErrorCode::Internal,
            TranslateError::NoMatch(_) => ErrorCode::NotFound,
        }
    }
}

impl From<ContextError> for TranslateError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Canceled => TranslateError::Canceled,
            ContextError::DeadlineExceeded => TranslateError::DeadlineExceeded,
        }
    }
}

/// Stateless translator from discovery requests to `iscsi-ls` runs.
///
/// Cheap to share behind an `Arc`; concurrent calls do not interact.
#[derive(Clone)]
pub struct CommandTranslator {
    runner: Arc<dyn CommandRunner>,
    program: String,
    dispatch: Option<Dispatch>,
}

impl CommandTranslator {
    /// Translator running `program` through `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
            dispatch: None,
        }
    }

    /// Translator spawning the real `program` as a child process.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self::new(Arc::new(ProcessRunner), program)
    }

    /// Send this translator's events to `dispatch` instead of the
    /// subscriber that is current at call time.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run one discovery request.
    pub async fn execute(
        &self,
        ctx: &CallContext,
        request: &CommandRequest,
    ) -> Result<CommandResponse, TranslateError> {
        let span = info_span!(
            "execute",
            command = %request.command,
            portal = %request.portal,
            initiator_name = %request.initiator_name,
            target_iqn = %request.target_iqn,
        );
        let call = self.translate(ctx, request).instrument(span);
        match &self.dispatch {
            Some(dispatch) => call.with_subscriber(dispatch.clone()).await,
            None => call.await,
        }
    }

    async fn translate(
        &self,
        ctx: &CallContext,
        request: &CommandRequest,
    ) -> Result<CommandResponse, TranslateError> {
        info!(
            command = %request.command,
            portal = %request.portal,
            initiator_name = %request.initiator_name,
            target_iqn = %request.target_iqn,
            "Received Execute request"
        );

        if request.command != ISCSI_LS {
            warn!(command = %request.command, "Unsupported command received");
            return Ok(CommandResponse::soft_error(UNSUPPORTED_COMMAND, ""));
        }

        let invocation = build_invocation(&self.program, request);
        info!(cmd = invocation.command_line(), "Executing command");

        let result = tokio::select! {
            result = self.runner.run(&invocation) => result,
            reason = ctx.done() => return Err(context_failure(reason)),
        };

        // A canceled or expired call explains whatever exit status the
        // tool produced, so the context is consulted first.
        if let Some(reason) = ctx.err() {
            return Err(context_failure(reason));
        }

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                error!(cmd = invocation.command_line(), error = %err, "Command execution failed");
                let message = format!(
                    "failed to run {ISCSI_LS}: {}: {err}",
                    invocation.command_line()
                );
                return Ok(CommandResponse::soft_error(
                    message,
                    String::from_utf8_lossy(err.output()),
                ));
            }
        };

        info!("Command executed successfully, parsing output");

        let targets = parse_targets(&output).map_err(|err| {
            error!(
                error = %err,
                output = %String::from_utf8_lossy(&output),
                "Failed to parse iscsi-ls output"
            );
            TranslateError::Parse(err)
        })?;

        match luns_for_target(targets, &request.target_iqn) {
            Some(luns) => {
                info!(lun_count = luns.len(), "Found matching target, returning LUNs");
                Ok(CommandResponse {
                    output: String::from_utf8_lossy(&output).into_owned(),
                    error: String::new(),
                    luns,
                })
            }
            None => {
                warn!("No matching LUNs found for target");
                Err(TranslateError::NoMatch(request.target_iqn.clone()))
            }
        }
    }
}

impl std::fmt::Debug for CommandTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTranslator")
            .field("program", &self.program)
            .field("dispatch", &self.dispatch.is_some())
            .finish()
    }
}

fn context_failure(reason: ContextError) -> TranslateError {
    match reason {
        ContextError::Canceled => warn!("Request canceled by client"),
        ContextError::DeadlineExceeded => warn!("Request timed out"),
    }
    reason.into()
}
