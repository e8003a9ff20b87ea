//! Runner for the compiled partition (C, C++, Java)
//!
//! State machine: WriteSource → Compile → {CompileFailed | Run} →
//! {RunFailed | Success} → Cleanup. Compile and Run carry independent
//! wall-clock budgets; the Run phase is never entered after a failed compile,
//! and compiler diagnostics reach the caller verbatim.
//!
//! Java carries a toolchain constraint, not a design choice: the source file
//! name must equal the declared public class name, so the submission's public
//! class is rewritten to the generated unique name before compilation.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;

use super::{join_input, resolve_run_outcome, ExecContext, Invoker};
use crate::errors::EngineError;
use crate::language::Language;
use crate::scratch::{ScratchDir, TempArtifact};
use crate::types::{ExecutionResult, ExecutionStatus};

pub struct CompiledRunner {
    scratch: ScratchDir,
    invoker: Arc<dyn Invoker>,
    compile_timeout: Duration,
    run_timeout: Duration,
}

impl CompiledRunner {
    pub fn new(
        scratch: ScratchDir,
        invoker: Arc<dyn Invoker>,
        compile_timeout: Duration,
        run_timeout: Duration,
    ) -> Self {
        CompiledRunner {
            scratch,
            invoker,
            compile_timeout,
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
        let artifact = self.scratch.allocate(language);
        let source = match language {
            Language::Java => rewrite_public_class(code, &artifact.class_name()),
            _ => code.to_string(),
        };
        artifact.write_source(&source).await?;

        let outcome = self.compile_then_run(&artifact, language, input, ctx).await;
        artifact.cleanup().await;
        outcome
    }

    async fn compile_then_run(
        &self,
        artifact: &TempArtifact,
        language: Language,
        input: &[String],
        ctx: &ExecContext,
    ) -> Result<ExecutionResult, EngineError> {
        let (compiler, compile_args) = self.compile_invocation(language, artifact)?;
        let cancel = ctx.phase_token(self.compile_timeout);
        let compiled = self
            .invoker
            .invoke(language, &compiler, &compile_args, None, &cancel)
            .await?;

        if compiled.timed_out {
            return Ok(ExecutionResult {
                stdout: compiled.stdout,
                stderr: compiled.stderr,
                status: ExecutionStatus::Timeout,
                exit_code: None,
            });
        }
        if compiled.exit_code != Some(0) || !compiled.stderr.trim().is_empty() {
            log::debug!(
                "compilation of {} failed with exit {:?}",
                artifact.token(),
                compiled.exit_code
            );
            return Ok(ExecutionResult {
                stdout: compiled.stdout,
                stderr: compiled.stderr,
                status: ExecutionStatus::CompileError,
                exit_code: compiled.exit_code,
            });
        }

        let (program, run_args) = self.run_invocation(language, artifact)?;
        let cancel = ctx.phase_token(self.run_timeout);
        let ran = self
            .invoker
            .invoke(language, &program, &run_args, Some(join_input(input)), &cancel)
            .await?;
        Ok(resolve_run_outcome(language, ran))
    }

    fn compile_invocation(
        &self,
        language: Language,
        artifact: &TempArtifact,
    ) -> Result<(String, Vec<String>), EngineError> {
        let view = self.invoker.scratch_view();
        let source = view
            .join(artifact.source_name())
            .to_string_lossy()
            .into_owned();
        match language {
            Language::C | Language::Cpp => {
                let binary = self.binary_in_view(artifact)?;
                let compiler = if language == Language::C { "gcc" } else { "g++" };
                Ok((
                    compiler.to_string(),
                    vec![source, "-o".to_string(), binary],
                ))
            }
            Language::Java => Ok((
                "javac".to_string(),
                vec![
                    "-d".to_string(),
                    view.to_string_lossy().into_owned(),
                    source,
                ],
            )),
            other => Err(EngineError::Internal(format!(
                "'{}' routed to the compiled runner",
                other
            ))),
        }
    }

    fn run_invocation(
        &self,
        language: Language,
        artifact: &TempArtifact,
    ) -> Result<(String, Vec<String>), EngineError> {
        match language {
            Language::C | Language::Cpp => Ok((self.binary_in_view(artifact)?, Vec::new())),
            Language::Java => Ok((
                "java".to_string(),
                vec![
                    "-cp".to_string(),
                    self.invoker.scratch_view().to_string_lossy().into_owned(),
                    artifact.class_name(),
                ],
            )),
            other => Err(EngineError::Internal(format!(
                "'{}' routed to the compiled runner",
                other
            ))),
        }
    }

    fn binary_in_view(&self, artifact: &TempArtifact) -> Result<String, EngineError> {
        let name = artifact.binary_name().ok_or_else(|| {
            EngineError::Internal("compiled artifact without a binary name".to_string())
        })?;
        Ok(self
            .invoker
            .scratch_view()
            .join(name)
            .to_string_lossy()
            .into_owned())
    }
}

/// Rewrites the declared public class (and every word-boundary reference to
/// it) to `class_name`. Sources without a public class pass through unchanged.
fn rewrite_public_class(code: &str, class_name: &str) -> String {
    static PUBLIC_CLASS: OnceLock<Regex> = OnceLock::new();
    let pattern = PUBLIC_CLASS.get_or_init(|| {
        Regex::new(r"public\s+(?:final\s+|abstract\s+)?class\s+([A-Za-z_$][A-Za-z0-9_$]*)")
            .expect("class pattern is valid")
    });

    let original = match pattern.captures(code).and_then(|caps| caps.get(1)) {
        Some(name) => name.as_str().to_string(),
        None => return code.to_string(),
    };
    match Regex::new(&format!(r"\b{}\b", regex::escape(&original))) {
        Ok(word) => word.replace_all(code, class_name).into_owned(),
        Err(_) => code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::{MockInvoker, StreamedOutput};

    fn runner(dir: &tempfile::TempDir) -> (Arc<MockInvoker>, CompiledRunner) {
        let scratch = ScratchDir::create(dir.path()).unwrap();
        let invoker = Arc::new(MockInvoker::new(dir.path()));
        let runner = CompiledRunner::new(
            scratch,
            invoker.clone() as Arc<dyn Invoker>,
            Duration::from_secs(10),
            Duration::from_secs(5),
        );
        (invoker, runner)
    }

    #[tokio::test]
    async fn test_compile_error_never_enters_run_phase() {
        let dir = tempfile::tempdir().unwrap();
        let (invoker, runner) = runner(&dir);
        invoker.push_output(StreamedOutput {
            stderr: "snippet.c:1: error: expected ';'".to_string(),
            exit_code: Some(1),
            ..StreamedOutput::default()
        });

        let ctx = ExecContext::new();
        let result = runner
            .execute(Language::C, "int main( {", &[], &ctx)
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::CompileError);
        assert_eq!(result.stderr, "snippet.c:1: error: expected ';'");
        assert_eq!(invoker.recorded_calls().len(), 1, "run phase was entered");
    }

    #[tokio::test]
    async fn test_compiler_diagnostics_on_clean_exit_still_fail() {
        let dir = tempfile::tempdir().unwrap();
        let (invoker, runner) = runner(&dir);
        invoker.push_output(StreamedOutput {
            stderr: "warning: unused variable 'x'".to_string(),
            exit_code: Some(0),
            ..StreamedOutput::default()
        });

        let ctx = ExecContext::new();
        let result = runner
            .execute(Language::Cpp, "int main(){int x;}", &[], &ctx)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::CompileError);
    }

    #[tokio::test]
    async fn test_successful_pipeline_compiles_then_runs_binary() {
        let dir = tempfile::tempdir().unwrap();
        let (invoker, runner) = runner(&dir);
        invoker.push_output(StreamedOutput {
            exit_code: Some(0),
            ..StreamedOutput::default()
        });
        invoker.push_output(StreamedOutput {
            stdout: "Hello, World!\n".to_string(),
            exit_code: Some(0),
            ..StreamedOutput::default()
        });

        let ctx = ExecContext::new();
        let result = runner
            .execute(
                Language::Cpp,
                "#include <iostream>\nint main(){std::cout<<\"Hello, World!\\n\";}",
                &["ignored".to_string()],
                &ctx,
            )
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.stdout, "Hello, World!\n");

        let calls = invoker.recorded_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, "g++");
        assert!(calls[1].program.contains("snippet_"));
        assert_eq!(calls[1].stdin.as_deref(), Some("ignored\n"));
    }

    #[tokio::test]
    async fn test_compile_timeout_reported_as_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let (invoker, runner) = runner(&dir);
        invoker.push_output(StreamedOutput {
            timed_out: true,
            ..StreamedOutput::default()
        });

        let ctx = ExecContext::new();
        let result = runner
            .execute(Language::C, "int main(){}", &[], &ctx)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert_eq!(invoker.recorded_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_java_compile_uses_rewritten_source_name() {
        let dir = tempfile::tempdir().unwrap();
        let (invoker, runner) = runner(&dir);
        invoker.push_output(StreamedOutput {
            exit_code: Some(0),
            ..StreamedOutput::default()
        });
        invoker.push_output(StreamedOutput {
            stdout: "ok\n".to_string(),
            exit_code: Some(0),
            ..StreamedOutput::default()
        });

        let ctx = ExecContext::new();
        let result = runner
            .execute(
                Language::Java,
                "public class Main { public static void main(String[] a) {} }",
                &[],
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);

        let calls = invoker.recorded_calls();
        assert_eq!(calls[0].program, "javac");
        assert!(calls[0].args.iter().any(|a| a.contains("Main_")));
        assert_eq!(calls[1].program, "java");
        assert!(calls[1].args.iter().any(|a| a.starts_with("Main_")));
    }

    #[test]
    fn test_rewrite_replaces_every_reference_to_the_public_class() {
        let rewritten = rewrite_public_class(
            "public class Main { Main() {} static Main make() { return new Main(); } }",
            "Main_abc123",
        );
        assert!(!rewritten.contains("class Main "));
        assert_eq!(rewritten.matches("Main_abc123").count(), 4);
    }

    #[test]
    fn test_rewrite_leaves_lowercase_main_method_alone() {
        let rewritten = rewrite_public_class(
            "public class Main { public static void main(String[] a) {} }",
            "Main_x",
        );
        assert!(rewritten.contains("void main(String[] a)"));
        assert!(rewritten.contains("class Main_x"));
    }

    #[test]
    fn test_rewrite_without_public_class_is_identity() {
        let code = "class Helper {}";
        assert_eq!(rewrite_public_class(code, "Main_x"), code);
    }
}
