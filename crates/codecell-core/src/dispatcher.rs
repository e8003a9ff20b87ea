//! Single entry point: validation, admission control and runner routing
//!
//! The dispatcher is the only component that knows the language set splits
//! into interpreted and compiled; it validates request shape before any
//! resource is allocated, admits work through a bounded pool sized to host
//! capacity, and returns whatever the chosen runner produced, untransformed.
//! Requests beyond the in-flight cap are rejected up front rather than
//! spawning without bound.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::executors::compiled::CompiledRunner;
use crate::executors::docker::DockerInvoker;
use crate::executors::host::HostInvoker;
use crate::executors::interpreted::InterpretedRunner;
use crate::executors::{ExecContext, Invoker};
use crate::language::{Language, LanguageKind};
use crate::scratch::ScratchDir;
use crate::session::{SessionRegistry, SessionRound};
use crate::types::{ExecutionRequest, ExecutionResponse, ExecutionResult};

pub struct Dispatcher {
    config: EngineConfig,
    interpreted: InterpretedRunner,
    compiled: CompiledRunner,
    sessions: Arc<SessionRegistry>,
    pool: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
}

impl Dispatcher {
    /// Builds the engine from configuration, choosing the host or container
    /// invoker according to the isolation setting.
    pub async fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let scratch = ScratchDir::create(&config.scratch_dir)?;
        let invoker: Arc<dyn Invoker> = if config.isolation.enabled {
            log::info!("isolation enabled, executions run in disposable containers");
            Arc::new(
                DockerInvoker::connect(scratch.root().to_path_buf(), &config.isolation.images)
                    .await?,
            )
        } else {
            Arc::new(HostInvoker::new(scratch.root().to_path_buf()))
        };
        Self::assemble(config, scratch, invoker)
    }

    /// Same as [`Dispatcher::new`] but with a caller-supplied invocation
    /// backend.
    pub async fn with_invoker(
        config: EngineConfig,
        invoker: Arc<dyn Invoker>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let scratch = ScratchDir::create(&config.scratch_dir)?;
        Self::assemble(config, scratch, invoker)
    }

    fn assemble(
        config: EngineConfig,
        scratch: ScratchDir,
        invoker: Arc<dyn Invoker>,
    ) -> Result<Self, EngineError> {
        let interpreted =
            InterpretedRunner::new(scratch.clone(), invoker.clone(), config.run_timeout());
        let compiled = CompiledRunner::new(
            scratch.clone(),
            invoker,
            config.compile_timeout(),
            config.run_timeout(),
        );
        let sessions = SessionRegistry::new(scratch, config.session.clone());
        Ok(Dispatcher {
            pool: Arc::new(Semaphore::new(config.max_concurrent)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            config,
            interpreted,
            compiled,
            sessions,
        })
    }

    /// One-shot execution: all input is written up front, stdin is closed,
    /// and exactly one result is produced.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, EngineError> {
        let language = Self::validate(request)?;
        let _admission = self.admit().await?;
        let ctx = ExecContext::new();
        match language.kind() {
            LanguageKind::Interpreted => {
                self.interpreted
                    .execute(language, &request.code, &request.input, &ctx)
                    .await
            }
            LanguageKind::Compiled => {
                self.compiled
                    .execute(language, &request.code, &request.input, &ctx)
                    .await
            }
        }
    }

    /// Interactive execution: opens a session when no id is supplied,
    /// otherwise feeds the live process another round.
    pub async fn execute_interactive(
        &self,
        request: &ExecutionRequest,
    ) -> Result<SessionRound, EngineError> {
        match &request.session_id {
            Some(id) => self.sessions.round(id, &request.input).await,
            None => {
                let language = Self::validate(request)?;
                let _admission = self.admit().await?;
                self.sessions
                    .open(language, &request.code, &request.input)
                    .await
            }
        }
    }

    /// One-shot execution mapped straight onto the wire contract.
    pub async fn respond(&self, request: &ExecutionRequest) -> ExecutionResponse {
        ExecutionResponse::from_outcome(&self.execute(request).await)
    }

    /// Interactive execution mapped onto the wire contract, session id
    /// included while the session is live.
    pub async fn respond_interactive(&self, request: &ExecutionRequest) -> ExecutionResponse {
        match self.execute_interactive(request).await {
            Ok(round) => {
                let response = ExecutionResponse::from_result(&round.result);
                match round.session_id {
                    Some(id) => response.with_session_id(id),
                    None => response,
                }
            }
            Err(err) => ExecutionResponse::from_engine_error(&err),
        }
    }

    fn validate(request: &ExecutionRequest) -> Result<Language, EngineError> {
        if request.code.trim().is_empty() {
            return Err(EngineError::Validation("code must not be empty".to_string()));
        }
        request.language.parse()
    }

    async fn admit(&self) -> Result<AdmissionGuard, EngineError> {
        let previous = self.in_flight.fetch_add(1, Ordering::SeqCst);
        if previous >= self.config.max_pending {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            log::warn!("admission rejected, {} requests already in flight", previous);
            return Err(EngineError::Overloaded);
        }
        let permit = self
            .pool
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Internal("worker pool closed".to_string()))?;
        Ok(AdmissionGuard {
            in_flight: self.in_flight.clone(),
            _permit: permit,
        })
    }
}

struct AdmissionGuard {
    in_flight: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::{MockInvoker, StreamedOutput};
    use crate::types::ExecutionStatus;
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn request(language: &str, code: &str) -> ExecutionRequest {
        ExecutionRequest {
            code: code.to_string(),
            language: language.to_string(),
            input: Vec::new(),
            session_id: None,
        }
    }

    async fn dispatcher_with_mock(
        dir: &tempfile::TempDir,
    ) -> (Arc<MockInvoker>, Dispatcher) {
        let config = EngineConfig {
            scratch_dir: dir.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let invoker = Arc::new(MockInvoker::new(dir.path()));
        let dispatcher = Dispatcher::with_invoker(config, invoker.clone())
            .await
            .unwrap();
        (invoker, dispatcher)
    }

    #[tokio::test]
    async fn test_unknown_language_rejected_before_any_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let (invoker, dispatcher) = dispatcher_with_mock(&dir).await;
        let err = dispatcher
            .execute(&request("cobol", "DISPLAY 'HI'."))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedLanguage(_)));
        assert!(invoker.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_code_rejected_before_any_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let (invoker, dispatcher) = dispatcher_with_mock(&dir).await;
        let err = dispatcher.execute(&request("python", "   ")).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(invoker.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn test_routes_interpreted_and_compiled_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let (invoker, dispatcher) = dispatcher_with_mock(&dir).await;

        dispatcher.execute(&request("python", "print(1)")).await.unwrap();
        let calls = invoker.recorded_calls();
        assert_eq!(calls.last().unwrap().program, "python3");

        invoker.push_output(StreamedOutput {
            exit_code: Some(0),
            ..StreamedOutput::default()
        });
        invoker.push_output(StreamedOutput {
            exit_code: Some(0),
            ..StreamedOutput::default()
        });
        dispatcher.execute(&request("c", "int main(){}")).await.unwrap();
        let calls = invoker.recorded_calls();
        assert_eq!(calls[calls.len() - 2].program, "gcc");
    }

    #[tokio::test]
    async fn test_result_passes_through_untransformed() {
        let dir = tempfile::tempdir().unwrap();
        let (invoker, dispatcher) = dispatcher_with_mock(&dir).await;
        invoker.push_output(StreamedOutput {
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            exit_code: Some(0),
            ..StreamedOutput::default()
        });
        let result = dispatcher.execute(&request("js", "x")).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.stdout, "out");
        assert_eq!(result.stderr, "err");
    }

    #[tokio::test]
    async fn test_wire_response_for_unsupported_language() {
        let dir = tempfile::tempdir().unwrap();
        let (_invoker, dispatcher) = dispatcher_with_mock(&dir).await;
        let response = dispatcher.respond(&request("fortran", "X")).await;
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["error"].as_str().unwrap().contains("unsupported language"));
        assert_eq!(json["output"]["stderr"], "");
    }

    struct SlowInvoker {
        view: std::path::PathBuf,
        delay: Duration,
    }

    #[async_trait]
    impl Invoker for SlowInvoker {
        fn scratch_view(&self) -> &Path {
            &self.view
        }

        async fn invoke(
            &self,
            _language: Language,
            _program: &str,
            _args: &[String],
            _stdin: Option<String>,
            _cancel: &CancellationToken,
        ) -> Result<StreamedOutput, EngineError> {
            tokio::time::sleep(self.delay).await;
            Ok(StreamedOutput {
                exit_code: Some(0),
                ..StreamedOutput::default()
            })
        }
    }

    #[tokio::test]
    async fn test_admission_rejects_beyond_in_flight_cap() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            scratch_dir: dir.path().to_path_buf(),
            max_concurrent: 1,
            max_pending: 1,
            ..EngineConfig::default()
        };
        let invoker = Arc::new(SlowInvoker {
            view: dir.path().to_path_buf(),
            delay: Duration::from_millis(500),
        });
        let dispatcher = Arc::new(Dispatcher::with_invoker(config, invoker).await.unwrap());

        let first = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.execute(&request("python", "1")).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let err = dispatcher
            .execute(&request("python", "2"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Overloaded));

        first.await.unwrap().unwrap();
        // Capacity is released once the first execution settles.
        dispatcher.execute(&request("python", "3")).await.unwrap();
    }
}
