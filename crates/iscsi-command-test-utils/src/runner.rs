//! A [`CommandRunner`] that plays back a fixed outcome.
//!
//! [`ScriptedRunner`] never spawns anything. It records every
//! [`Invocation`] it receives so tests can assert on the argument vector,
//! and counts hung calls whose futures were dropped before completing.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use iscsi_command_core::BoxFuture;
use iscsi_command_core::runner::{CommandRunner, Invocation, RunError};

/// What every call to the runner produces.
#[derive(Debug, Clone)]
pub enum Step {
    /// Exit 0 with this combined output.
    Output(Vec<u8>),
    /// Non-zero exit with this code and combined output.
    Exit { code: i32, output: Vec<u8> },
    /// The program could not be started.
    Spawn(String),
    /// Never completes.
    Hang,
}

pub struct ScriptedRunner {
    step: Step,
    calls: Mutex<Vec<Invocation>>,
    abandoned: Arc<AtomicUsize>,
}

impl ScriptedRunner {
    pub fn new(step: Step) -> Arc<Self> {
        Arc::new(Self {
            step,
            calls: Mutex::new(Vec::new()),
            abandoned: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn succeeding(output: impl Into<Vec<u8>>) -> Arc<Self> {
        Self::new(Step::Output(output.into()))
    }

    pub fn exiting(code: i32, output: impl Into<Vec<u8>>) -> Arc<Self> {
        Self::new(Step::Exit {
            code,
            output: output.into(),
        })
    }

    pub fn failing_to_spawn(message: &str) -> Arc<Self> {
        Self::new(Step::Spawn(message.to_string()))
    }

    pub fn hanging() -> Arc<Self> {
        Self::new(Step::Hang)
    }

    /// Every invocation received so far, oldest first.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock poisoned").len()
    }

    /// Hung calls whose future was dropped (the caller gave up on them).
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<Vec<u8>, RunError>> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(invocation.clone());

        match &self.step {
            Step::Output(output) => {
                let output = output.clone();
                Box::pin(async move { Ok(output) })
            }
            Step::Exit { code, output } => {
                let err = RunError::Exit {
                    code: Some(*code),
                    output: output.clone(),
                };
                Box::pin(async move { Err(err) })
            }
            Step::Spawn(message) => {
                let err = RunError::Spawn(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    message.clone(),
                ));
                Box::pin(async move { Err(err) })
            }
            Step::Hang => {
                let guard = AbandonGuard(Arc::clone(&self.abandoned));
                Box::pin(async move {
                    let _guard = guard;
                    std::future::pending().await
                })
            }
        }
    }
}

struct AbandonGuard(Arc<AtomicUsize>);

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}
