//! Interactive sessions: one live interpreter process across many rounds
//!
//! A session keeps the interpreter alive with stdin open so successive inputs
//! reach the same process state. Round output is framed explicitly: a round
//! ends when the program prints the configured sentinel line (stripped from
//! the returned stdout), or when the round budget elapses for programs that
//! never emit it. Sessions die when their process exits, when a round can no
//! longer reach the process, or when the idle sweeper evicts them.
//!
//! Invariant: at most one live process per session id; rounds on one session
//! serialize on its handle lock, rounds on different sessions do not contend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::classifier;
use crate::config::SessionSettings;
use crate::errors::EngineError;
use crate::executors::host::{drain, exit_code_of, kill_process_tree, HostInvoker};
use crate::executors::join_input;
use crate::language::Language;
use crate::scratch::{ScratchDir, TempArtifact};
use crate::types::{ExecutionResult, ExecutionStatus};

/// Outcome of one interactive round. `session_id` is `None` once the
/// underlying process has exited and the session is gone.
#[derive(Debug)]
pub struct SessionRound {
    pub session_id: Option<String>,
    pub result: ExecutionResult,
}

pub struct SessionRegistry {
    scratch: ScratchDir,
    settings: SessionSettings,
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
}

struct SessionHandle {
    inner: Mutex<SessionInner>,
}

struct SessionInner {
    child: Child,
    stdin: ChildStdin,
    lines: mpsc::UnboundedReceiver<String>,
    stderr: Arc<Mutex<String>>,
    artifact: TempArtifact,
    language: Language,
    last_used: Instant,
}

impl SessionRegistry {
    /// Creates the registry and starts its idle-eviction sweeper. The sweeper
    /// holds only a weak reference, so dropping the registry stops it.
    pub fn new(scratch: ScratchDir, settings: SessionSettings) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry {
            scratch,
            settings,
            sessions: Mutex::new(HashMap::new()),
        });

        let weak = Arc::downgrade(&registry);
        let sweep_interval = registry.settings.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(registry) => registry.evict_idle().await,
                    None => break,
                }
            }
        });

        registry
    }

    /// Opens a session: spawns the interpreter on the submitted code, feeds
    /// the initial input without closing stdin, and returns the first frame
    /// plus the generated session id.
    pub async fn open(
        &self,
        language: Language,
        code: &str,
        input: &[String],
    ) -> Result<SessionRound, EngineError> {
        let interpreter = language.interpreter().ok_or_else(|| {
            EngineError::SessionError(format!(
                "interactive sessions require an interpreted language, got '{}'",
                language
            ))
        })?;

        let artifact = self.scratch.allocate(language);
        artifact.write_source(code).await?;
        let source = artifact.source_path().to_string_lossy().into_owned();

        let mut inner = self
            .spawn_session(interpreter, &[source], artifact, language)
            .await?;

        let write_ok = Self::write_round_input(&mut inner, input).await;
        let (frame, exited) = if write_ok {
            self.read_frame(&mut inner).await
        } else {
            (String::new(), true)
        };
        let result = Self::resolve_frame(&mut inner, frame, exited).await;

        if exited {
            inner.artifact.cleanup().await;
            return Ok(SessionRound {
                session_id: None,
                result,
            });
        }

        let session_id = Uuid::new_v4().to_string();
        let handle = Arc::new(SessionHandle {
            inner: Mutex::new(inner),
        });
        self.sessions
            .lock()
            .await
            .insert(session_id.clone(), handle);
        log::info!("opened {} session {}", language, session_id);

        Ok(SessionRound {
            session_id: Some(session_id),
            result,
        })
    }

    /// Feeds new input to an existing session and returns the next frame.
    pub async fn round(
        &self,
        session_id: &str,
        input: &[String],
    ) -> Result<SessionRound, EngineError> {
        let handle = self
            .sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        let mut inner = handle.inner.lock().await;
        inner.last_used = Instant::now();

        let write_ok = Self::write_round_input(&mut inner, input).await;
        let (frame, exited) = if write_ok {
            self.read_frame(&mut inner).await
        } else {
            (String::new(), true)
        };
        let result = Self::resolve_frame(&mut inner, frame, exited).await;
        inner.last_used = Instant::now();

        if exited {
            inner.artifact.cleanup().await;
            drop(inner);
            self.sessions.lock().await.remove(session_id);
            log::info!("session {} ended, process exited", session_id);
            return Ok(SessionRound {
                session_id: None,
                result,
            });
        }

        Ok(SessionRound {
            session_id: Some(session_id.to_string()),
            result,
        })
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn spawn_session(
        &self,
        program: &str,
        args: &[String],
        artifact: TempArtifact,
        language: Language,
    ) -> Result<SessionInner, EngineError> {
        let mut child = HostInvoker::base_command(self.scratch.root(), program, args).spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Internal("session stdin was not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Internal("session stdout was not piped".to_string()))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Internal("session stderr was not piped".to_string()))?;

        let (tx, lines) = mpsc::unbounded_channel();
        let mut reader = BufReader::new(stdout).lines();
        tokio::spawn(async move {
            while let Ok(Some(line)) = reader.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let stderr = Arc::new(Mutex::new(String::new()));
        let stderr_acc = stderr.clone();
        tokio::spawn(async move {
            let text = drain(stderr_pipe).await;
            stderr_acc.lock().await.push_str(&text);
        });

        Ok(SessionInner {
            child,
            stdin,
            lines,
            stderr,
            artifact,
            language,
            last_used: Instant::now(),
        })
    }

    async fn write_round_input(inner: &mut SessionInner, input: &[String]) -> bool {
        let payload = join_input(input);
        if payload.is_empty() {
            return true;
        }
        match inner.stdin.write_all(payload.as_bytes()).await {
            Ok(()) => inner.stdin.flush().await.is_ok(),
            Err(err) => {
                log::debug!("session stdin rejected input: {}", err);
                false
            }
        }
    }

    /// Accumulates stdout lines until the sentinel, stdout EOF (process gone)
    /// or the round budget. The sentinel itself is stripped.
    async fn read_frame(&self, inner: &mut SessionInner) -> (String, bool) {
        let deadline = tokio::time::sleep(self.settings.round_timeout());
        tokio::pin!(deadline);

        let mut acc = String::new();
        let mut exited = false;
        loop {
            tokio::select! {
                line = inner.lines.recv() => match line {
                    Some(line) if line.trim_end() == self.settings.sentinel => break,
                    Some(line) => {
                        acc.push_str(&line);
                        acc.push('\n');
                    }
                    None => {
                        exited = true;
                        break;
                    }
                },
                _ = &mut deadline => break,
            }
        }
        (acc, exited)
    }

    async fn resolve_frame(
        inner: &mut SessionInner,
        stdout: String,
        exited: bool,
    ) -> ExecutionResult {
        let stderr = std::mem::take(&mut *inner.stderr.lock().await);
        if !exited {
            return ExecutionResult {
                stdout,
                stderr,
                status: ExecutionStatus::Success,
                exit_code: None,
            };
        }

        let exit_code = match inner.child.wait().await {
            Ok(status) => exit_code_of(status),
            Err(err) => {
                log::warn!("failed to reap session process: {}", err);
                None
            }
        };
        let status = match exit_code {
            Some(0) => ExecutionStatus::Success,
            code => ExecutionStatus::RuntimeError(classifier::classify(
                inner.language,
                code,
                &stderr,
            )),
        };
        ExecutionResult {
            stdout,
            stderr,
            status,
            exit_code,
        }
    }

    async fn evict_idle(&self) {
        let idle_timeout = self.settings.idle_timeout();
        let doomed: Vec<(String, Arc<SessionHandle>)> = {
            let mut sessions = self.sessions.lock().await;
            let ids: Vec<String> = sessions
                .iter()
                .filter_map(|(id, handle)| match handle.inner.try_lock() {
                    Ok(inner) if inner.last_used.elapsed() >= idle_timeout => Some(id.clone()),
                    // A busy session is not idle; a locked one is busy.
                    _ => None,
                })
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|handle| (id, handle)))
                .collect()
        };

        for (id, handle) in doomed {
            let mut inner = handle.inner.lock().await;
            log::info!("evicting idle session {}", id);
            kill_process_tree(&mut inner.child);
            let _ = inner.child.wait().await;
            inner.artifact.cleanup().await;
        }
    }
}
