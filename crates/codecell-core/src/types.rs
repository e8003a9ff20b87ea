//! Request, result and wire-contract types
//!
//! The engine's public data model: what the collaborating HTTP layer hands in,
//! what it gets back, and the JSON shapes both sides agree on. Requests are
//! immutable once accepted; every request produces exactly one result (one per
//! round, for interactive sessions). The engine never reports `Success` for a
//! non-zero exit code.

use serde::{Deserialize, Serialize};

use crate::classifier::ErrorKind;
use crate::errors::EngineError;

/// One code-execution request as received from the HTTP layer.
///
/// `language` stays a plain string here: turning it into a [`Language`]
/// (or rejecting it) is the dispatcher's job, so that an unknown name fails
/// with `UnsupportedLanguage` before any resource is allocated.
///
/// [`Language`]: crate::language::Language
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: String,
    /// Lines fed to the program's standard input, in order.
    #[serde(default)]
    pub input: Vec<String>,
    /// Present on interactive (session) rounds after the first.
    #[serde(default, rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Terminal outcome of one execution (or one interactive round).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    CompileError,
    RuntimeError(ErrorKind),
    Timeout,
    UnsupportedLanguage,
    InternalError,
}

impl ExecutionStatus {
    /// The classified message surfaced in the wire response's `error` field.
    pub fn message(&self) -> Option<String> {
        match self {
            ExecutionStatus::Success => None,
            ExecutionStatus::CompileError => Some("compilation failed".to_string()),
            ExecutionStatus::RuntimeError(kind) => Some(format!("runtime error: {}", kind)),
            ExecutionStatus::Timeout => Some("execution timed out".to_string()),
            ExecutionStatus::UnsupportedLanguage => Some("unsupported language".to_string()),
            ExecutionStatus::InternalError => Some("internal execution error".to_string()),
        }
    }
}

/// Status equivalent of a platform-level failure, for callers that want the
/// full taxonomy in one type: request rejections that never spawned a process
/// fold into `UnsupportedLanguage` or `InternalError`.
impl From<&EngineError> for ExecutionStatus {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::UnsupportedLanguage(_) => ExecutionStatus::UnsupportedLanguage,
            _ => ExecutionStatus::InternalError,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub status: ExecutionStatus,
    /// Raw exit code (or 128+signal for signal deaths); `None` when the
    /// process was killed by the engine or never ran.
    pub exit_code: Option<i64>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// JSON response shape consumed by the HTTP layer.
///
/// Success: `{ "output": { "stdout": ..., "stderr": ... } }`
/// Failure: `{ "error": ..., "output": { "stderr": ... } }`
///
/// Mapping these onto HTTP status codes stays with the HTTP layer.
#[derive(Debug, Serialize)]
pub struct ExecutionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub output: ResponseOutput,
    /// Session id for interactive rounds, echoed (or freshly generated on the
    /// opening round) so the caller can continue the conversation.
    #[serde(skip_serializing_if = "Option::is_none", rename = "sessionId")]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResponseOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    pub stderr: String,
}

impl ExecutionResponse {
    pub fn from_result(result: &ExecutionResult) -> Self {
        match result.status.message() {
            None => ExecutionResponse {
                error: None,
                output: ResponseOutput {
                    stdout: Some(result.stdout.clone()),
                    stderr: result.stderr.clone(),
                },
                session_id: None,
            },
            Some(message) => ExecutionResponse {
                error: Some(message),
                output: ResponseOutput {
                    stdout: None,
                    stderr: result.stderr.clone(),
                },
                session_id: None,
            },
        }
    }

    pub fn from_engine_error(err: &EngineError) -> Self {
        ExecutionResponse {
            error: Some(err.to_string()),
            output: ResponseOutput {
                stdout: None,
                stderr: String::new(),
            },
            session_id: None,
        }
    }

    pub fn from_outcome(outcome: &Result<ExecutionResult, EngineError>) -> Self {
        match outcome {
            Ok(result) => Self::from_result(result),
            Err(err) => Self::from_engine_error(err),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}
