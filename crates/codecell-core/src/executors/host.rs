//! Direct host invocation of interpreters and toolchains
//!
//! Programs are always spawned with an explicit argument vector; submitted
//! code never passes through a shell string, it is materialized to a file by
//! the caller and referenced by path. Children are placed in their own process
//! group so that a timeout kill takes the whole tree down with them.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use super::{Invoker, StreamedOutput};
use crate::errors::EngineError;
use crate::language::Language;

pub struct HostInvoker {
    scratch: PathBuf,
}

impl HostInvoker {
    pub fn new(scratch: impl Into<PathBuf>) -> Self {
        HostInvoker {
            scratch: scratch.into(),
        }
    }

    /// Piped-stdio command rooted in the scratch directory. Shared with the
    /// session registry, which keeps stdin open across rounds.
    pub(crate) fn base_command(scratch: &Path, program: &str, args: &[String]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(scratch)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

/// Incremental accumulation: reads as data arrives rather than one blocking
/// read at process end, so a timeout still returns partial output.
pub(crate) async fn drain(mut reader: impl AsyncRead + Unpin) -> String {
    let mut acc = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => acc.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&acc).into_owned()
}

/// SIGKILL to the child's process group, then to the child itself.
pub(crate) fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
    let _ = child.start_kill();
}

pub(crate) fn exit_code_of(status: std::process::ExitStatus) -> Option<i64> {
    if let Some(code) = status.code() {
        return Some(code as i64);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(128 + signal as i64);
        }
    }
    None
}

#[async_trait]
impl Invoker for HostInvoker {
    fn scratch_view(&self) -> &Path {
        &self.scratch
    }

    async fn invoke(
        &self,
        _language: Language,
        program: &str,
        args: &[String],
        stdin: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<StreamedOutput, EngineError> {
        let mut child = Self::base_command(&self.scratch, program, args).spawn()?;

        // Feed input and close the pipe (EOF). Writing happens off to the
        // side so a child that never reads stdin cannot wedge the engine.
        if let Some(mut sink) = child.stdin.take() {
            let payload = stdin.unwrap_or_default();
            tokio::spawn(async move {
                if !payload.is_empty() {
                    if let Err(err) = sink.write_all(payload.as_bytes()).await {
                        log::debug!("stdin pipe closed before input was consumed: {}", err);
                    }
                }
            });
        }

        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Internal("child stdout was not piped".to_string()))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Internal("child stderr was not piped".to_string()))?;
        let stdout_task = tokio::spawn(drain(stdout_pipe));
        let stderr_task = tokio::spawn(drain(stderr_pipe));

        let waited = tokio::select! {
            status = child.wait() => Some(status?),
            _ = cancel.cancelled() => None,
        };

        let (exit_code, timed_out) = match waited {
            Some(status) => (exit_code_of(status), false),
            None => {
                log::warn!("'{}' exceeded its budget, killing process group", program);
                kill_process_tree(&mut child);
                let _ = child.wait().await;
                (None, true)
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        Ok(StreamedOutput {
            stdout,
            stderr,
            exit_code,
            timed_out,
        })
    }
}
