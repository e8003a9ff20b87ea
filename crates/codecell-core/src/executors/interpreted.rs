//! Runner for the interpreted partition (Python, JavaScript)
//!
//! Materializes the submission to a scratch file, hands the interpreter an
//! explicit argument vector through the invoker seam, and resolves the
//! streamed outcome. One temp file, at most one live process per call.

use std::sync::Arc;
use std::time::Duration;

use super::{join_input, resolve_run_outcome, ExecContext, Invoker};
use crate::errors::EngineError;
use crate::language::Language;
use crate::scratch::ScratchDir;
use crate::types::ExecutionResult;

pub struct InterpretedRunner {
    scratch: ScratchDir,
    invoker: Arc<dyn Invoker>,
    run_timeout: Duration,
}

impl InterpretedRunner {
    pub fn new(scratch: ScratchDir, invoker: Arc<dyn Invoker>, run_timeout: Duration) -> Self {
        InterpretedRunner {
            scratch,
            invoker,
            run_timeout,
        }
    }

    pub async fn execute(
        &self,
        language: Language,
        code: &str,
        input: &[String],
        ctx: &ExecContext,
    ) -> Result<ExecutionResult, EngineError> {
        let interpreter = language.interpreter().ok_or_else(|| {
            EngineError::Internal(format!("'{}' routed to the interpreted runner", language))
        })?;

        let artifact = self.scratch.allocate(language);
        artifact.write_source(code).await?;
        log::debug!("running {} submission {}", language, artifact.token());

        let source = self
            .invoker
            .scratch_view()
            .join(artifact.source_name())
            .to_string_lossy()
            .into_owned();
        let cancel = ctx.phase_token(self.run_timeout);
        let invoked = self
            .invoker
            .invoke(language, interpreter, &[source], Some(join_input(input)), &cancel)
            .await;

        artifact.cleanup().await;
        Ok(resolve_run_outcome(language, invoked?))
    }
}
