//! Remote code-execution engine for user-submitted source.
//!
//! This crate accepts arbitrary source code in a fixed set of languages, runs
//! it outside the calling process, and returns captured output under time and
//! resource constraints. The architecture emphasizes a strict failure
//! taxonomy (callers can always tell "the submitted program is broken" from
//! "the platform refused or could not finish") and safe multiplexing of
//! untrusted programs over shared host resources.
//!
//! # Architecture Overview
//!
//! The engine is organized around a few subsystems:
//!
//! - **Dispatcher**: request validation, bounded admission, and routing
//!   across the interpreted/compiled partition
//! - **Runners**: interpreter invocation and compile-then-run pipelines with
//!   independent phase budgets
//! - **Invocation seam**: host processes or disposable per-language
//!   containers behind one contract, chosen by configuration
//! - **Session registry**: long-lived interactive processes with framed
//!   rounds and idle eviction
//! - **Scratch management**: collision-free per-execution artifacts in a
//!   shared scratch directory
//! - **Error classification**: ordered pattern table mapping process
//!   failures to named kinds

pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod executors;
pub mod language;
pub mod scratch;
pub mod session;
pub mod types;

pub use classifier::ErrorKind;
pub use config::{EngineConfig, IsolationConfig, SessionSettings};
pub use dispatcher::Dispatcher;
pub use errors::EngineError;
pub use executors::{ExecContext, Invoker, StreamedOutput};
pub use language::{Language, LanguageKind};
pub use scratch::{ScratchDir, TempArtifact};
pub use session::{SessionRegistry, SessionRound};
pub use types::{ExecutionRequest, ExecutionResponse, ExecutionResult, ExecutionStatus};

#[cfg(test)]
mod engine_integration_test;
