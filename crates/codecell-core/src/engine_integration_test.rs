//! End-to-end engine tests.
//!
//! The concurrency test is hermetic; the rest drive real interpreters and
//! toolchains through the host invoker and are ignored by default; run them
//! on a host with python3 / g++ / a JDK installed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::classifier::ErrorKind;
use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::executors::MockInvoker;
use crate::types::{ExecutionRequest, ExecutionStatus};

fn request(language: &str, code: &str, input: &[&str]) -> ExecutionRequest {
    ExecutionRequest {
        code: code.to_string(),
        language: language.to_string(),
        input: input.iter().map(|s| s.to_string()).collect(),
        session_id: None,
    }
}

fn config_in(dir: &tempfile::TempDir) -> EngineConfig {
    EngineConfig {
        scratch_dir: dir.path().to_path_buf(),
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn test_fifty_concurrent_executions_all_settle() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        max_concurrent: 8,
        max_pending: 64,
        ..config_in(&dir)
    };
    let invoker = Arc::new(MockInvoker::new(dir.path()));
    let dispatcher = Arc::new(Dispatcher::with_invoker(config, invoker).await.unwrap());

    let mut handles = Vec::new();
    for i in 0..50 {
        let dispatcher = dispatcher.clone();
        handles.push(tokio::spawn(async move {
            dispatcher
                .execute(&request("python", &format!("print({})", i), &[]))
                .await
        }));
    }
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
    }
}

#[tokio::test]
#[ignore] // Requires python3 on the host
async fn test_python_stdout_matches_program_output() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(config_in(&dir)).await.unwrap();
    let result = dispatcher
        .execute(&request("python", "print('Hello')", &[]))
        .await
        .unwrap();
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout, "Hello\n");
    assert_eq!(result.stderr, "");
}

#[tokio::test]
#[ignore] // Requires python3 on the host
async fn test_python_division_by_zero_is_classified() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(config_in(&dir)).await.unwrap();
    let result = dispatcher
        .execute(&request("python", "print(1/0)", &[]))
        .await
        .unwrap();
    assert_eq!(
        result.status,
        ExecutionStatus::RuntimeError(ErrorKind::DivisionByZero)
    );
    assert_eq!(result.stdout, "");
    assert!(result.stderr.contains("ZeroDivisionError"));
}

#[tokio::test]
#[ignore] // Requires python3 on the host
async fn test_input_lines_are_fed_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(config_in(&dir)).await.unwrap();
    let code = "import sys\nlines = [l.strip() for l in sys.stdin]\nprint('-'.join(lines))";
    let result = dispatcher
        .execute(&request("python", code, &["first", "second"]))
        .await
        .unwrap();
    assert_eq!(result.stdout, "first-second\n");
}

#[tokio::test]
#[ignore] // Requires g++ on the host
async fn test_cpp_hello_world_compiles_and_runs() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(config_in(&dir)).await.unwrap();
    let code = "#include <iostream>\nint main() { std::cout << \"Hello, World!\\n\"; return 0; }";
    let result = dispatcher.execute(&request("cpp", code, &[])).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout, "Hello, World!\n");
}

#[tokio::test]
#[ignore] // Requires g++ on the host
async fn test_cpp_syntax_error_never_runs() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(config_in(&dir)).await.unwrap();
    let result = dispatcher
        .execute(&request("cpp", "int main( { return 0; }", &[]))
        .await
        .unwrap();
    assert_eq!(result.status, ExecutionStatus::CompileError);
    assert!(!result.stderr.is_empty());
    // The rejected source is the only artifact; nothing was produced to run,
    // and cleanup leaves the scratch directory empty either way.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
#[ignore] // Requires a JDK on the host
async fn test_java_infinite_loop_times_out_within_margin() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        run_timeout_ms: 2_000,
        ..config_in(&dir)
    };
    let dispatcher = Dispatcher::new(config).await.unwrap();
    let code = "public class Main { public static void main(String[] a) { while (true) {} } }";

    let started = Instant::now();
    let result = dispatcher.execute(&request("java", code, &[])).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.status, ExecutionStatus::Timeout);
    // Compilation has its own budget; the run budget itself must be honored
    // with a small margin.
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(10), "took {:?}", elapsed);
}
