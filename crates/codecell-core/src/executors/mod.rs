//! Execution backends for running untrusted submissions
//!
//! Runners (interpreted and compiled) never spawn anything themselves; they go
//! through the [`Invoker`] seam, which turns "run this program with these
//! arguments against the scratch directory" into a captured outcome. The host
//! implementation spawns toolchains directly; the Docker implementation runs
//! the same invocation inside a disposable per-language container with the
//! scratch directory bind-mounted. The substitution is invisible to runner
//! contracts.
//!
//! Timeouts and (future) explicit cancellation share one mechanism: an
//! [`ExecContext`] hands each phase a cancellation token that fires when the
//! phase budget elapses or the whole execution is cancelled.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::classifier;
use crate::errors::EngineError;
use crate::language::Language;
use crate::types::{ExecutionResult, ExecutionStatus};

pub mod compiled;
pub mod docker;
pub mod host;
pub mod interpreted;

/// Captured outcome of one process invocation.
#[derive(Debug, Clone, Default)]
pub struct StreamedOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or 128+signal for signal deaths; `None` when the process
    /// was killed before exiting on its own.
    pub exit_code: Option<i64>,
    pub timed_out: bool,
}

#[async_trait]
pub trait Invoker: Send + Sync {
    /// Path at which the scratch directory is visible to the programs this
    /// invoker spawns. Runners build every file argument against this view.
    fn scratch_view(&self) -> &Path;

    /// Runs `program args`, feeding `stdin` (then EOF) when present, streaming
    /// stdout/stderr into accumulators as data arrives, until the process
    /// exits or `cancel` fires. Cancellation forcibly terminates the process
    /// and returns whatever output accumulated so far.
    async fn invoke(
        &self,
        language: Language,
        program: &str,
        args: &[String],
        stdin: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<StreamedOutput, EngineError>;
}

/// Cancellation context for one execution, threaded through every phase.
pub struct ExecContext {
    cancel: CancellationToken,
}

impl ExecContext {
    pub fn new() -> Self {
        ExecContext {
            cancel: CancellationToken::new(),
        }
    }

    /// Cancels every phase of this execution.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Child token that fires after `budget` elapses, or earlier if the whole
    /// execution is cancelled. Each phase (compile, run) gets its own.
    pub(crate) fn phase_token(&self, budget: Duration) -> CancellationToken {
        let token = self.cancel.child_token();
        let timer = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(budget) => timer.cancel(),
                _ = timer.cancelled() => {}
            }
        });
        token
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Joined stdin payload: input lines in order, newline-terminated.
pub(crate) fn join_input(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut payload = lines.join("\n");
    payload.push('\n');
    payload
}

/// Shared Run-phase resolution: identical for interpreted and compiled
/// submissions. Never reports `Success` for a non-zero exit.
pub(crate) fn resolve_run_outcome(language: Language, output: StreamedOutput) -> ExecutionResult {
    if output.timed_out {
        return ExecutionResult {
            stdout: output.stdout,
            stderr: output.stderr,
            status: ExecutionStatus::Timeout,
            exit_code: None,
        };
    }
    match output.exit_code {
        Some(0) => ExecutionResult {
            stdout: output.stdout,
            stderr: output.stderr,
            status: ExecutionStatus::Success,
            exit_code: Some(0),
        },
        code => {
            let kind = classifier::classify(language, code, &output.stderr);
            ExecutionResult {
                stdout: output.stdout,
                stderr: output.stderr,
                status: ExecutionStatus::RuntimeError(kind),
                exit_code: code,
            }
        }
    }
}

// Mock implementation for testing: replays a scripted sequence of outputs and
// records every invocation it sees.
pub struct MockInvoker {
    view: PathBuf,
    script: std::sync::Mutex<std::collections::VecDeque<StreamedOutput>>,
    calls: std::sync::Mutex<Vec<RecordedCall>>,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl MockInvoker {
    pub fn new(view: impl Into<PathBuf>) -> Self {
        MockInvoker {
            view: view.into(),
            script: std::sync::Mutex::new(std::collections::VecDeque::new()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn push_output(&self, output: StreamedOutput) {
        self.script.lock().unwrap().push_back(output);
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Invoker for MockInvoker {
    fn scratch_view(&self) -> &Path {
        &self.view
    }

    async fn invoke(
        &self,
        _language: Language,
        program: &str,
        args: &[String],
        stdin: Option<String>,
        _cancel: &CancellationToken,
    ) -> Result<StreamedOutput, EngineError> {
        self.calls.lock().unwrap().push(RecordedCall {
            program: program.to_string(),
            args: args.to_vec(),
            stdin,
        });
        let scripted = self.script.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or(StreamedOutput {
            exit_code: Some(0),
            ..StreamedOutput::default()
        }))
    }
}
