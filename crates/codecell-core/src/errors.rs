//! Error types for the execution engine's platform-level failures
//!
//! This module covers the faults that are the platform's problem, not the
//! submitted program's: rejected requests, exhausted capacity, filesystem and
//! container faults. Failures *of the submitted code* (compile errors, runtime
//! errors, timeouts) are not errors in this sense: they are ordinary
//! `ExecutionResult` outcomes, so callers can always tell "your program is
//! broken" apart from "the platform could not serve you".

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unsupported language: '{0}'")]
    UnsupportedLanguage(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("engine at capacity, request rejected")]
    Overloaded,
    #[error("no live session with id '{0}'")]
    SessionNotFound(String),
    #[error("session rejected: {0}")]
    SessionError(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Docker (bollard) error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// True for the failures the external HTTP layer maps to a 4xx: the
    /// request itself was refused before any process was spawned.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            EngineError::UnsupportedLanguage(_)
                | EngineError::Validation(_)
                | EngineError::Overloaded
                | EngineError::SessionNotFound(_)
                | EngineError::SessionError(_)
        )
    }
}
