//! Container-backed invocation: the optional isolation boundary
//!
//! Fulfills the same [`Invoker`] contract as the host implementation by
//! running each invocation inside a disposable per-language container with the
//! scratch directory bind-mounted read/write at a stable path. The container
//! is created, attached (so stdin can be fed and output streamed), started,
//! and awaited under the same cancellation token as a host process; a timeout
//! stops the container and `auto_remove` disposes of it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
#[allow(deprecated)]
use bollard::container::AttachContainerOptions;
use bollard::container::{AttachContainerResults, LogOutput};
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{Invoker, StreamedOutput};
use crate::errors::EngineError;
use crate::language::Language;

/// In-container mount point of the scratch directory.
pub const CONTAINER_SCRATCH: &str = "/sandbox";

/// Grace period for the attach stream to close once the container stopped.
const ATTACH_DRAIN_GRACE: Duration = Duration::from_secs(2);

pub struct DockerInvoker {
    docker: Docker,
    scratch_host: PathBuf,
    view: PathBuf,
    images: HashMap<Language, String>,
}

impl DockerInvoker {
    /// Connects to the local daemon and resolves the per-language image set,
    /// applying configured overrides on top of the built-in defaults.
    pub async fn connect(
        scratch_host: impl Into<PathBuf>,
        image_overrides: &HashMap<String, String>,
    ) -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()?;
        let mut images = HashMap::new();
        for language in Language::ALL {
            let image = image_overrides
                .get(language.as_str())
                .cloned()
                .unwrap_or_else(|| language.default_image().to_string());
            images.insert(language, image);
        }
        Ok(DockerInvoker {
            docker,
            scratch_host: scratch_host.into(),
            view: PathBuf::from(CONTAINER_SCRATCH),
            images,
        })
    }

    fn image_for(&self, language: Language) -> String {
        self.images
            .get(&language)
            .cloned()
            .unwrap_or_else(|| language.default_image().to_string())
    }
}

#[async_trait]
impl Invoker for DockerInvoker {
    fn scratch_view(&self) -> &Path {
        &self.view
    }

    async fn invoke(
        &self,
        language: Language,
        program: &str,
        args: &[String],
        stdin: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<StreamedOutput, EngineError> {
        let image = self.image_for(language);
        let mut cmd = Vec::with_capacity(args.len() + 1);
        cmd.push(program.to_string());
        cmd.extend(args.iter().cloned());

        let options = Some(CreateContainerOptions {
            name: Some(format!("codecell-exec-{}", Uuid::new_v4())),
            ..Default::default()
        });

        let config = ContainerCreateBody {
            image: Some(image),
            cmd: Some(cmd),
            working_dir: Some(CONTAINER_SCRATCH.to_string()),
            host_config: Some(HostConfig {
                binds: Some(vec![format!(
                    "{}:{}",
                    self.scratch_host.display(),
                    CONTAINER_SCRATCH
                )]),
                auto_remove: Some(true),
                network_mode: Some("none".to_string()),
                ..Default::default()
            }),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            open_stdin: Some(true),
            stdin_once: Some(true),
            ..Default::default()
        };

        let container = self.docker.create_container(options, config).await?;

        #[allow(deprecated)]
        let AttachContainerResults { output, mut input } = self
            .docker
            .attach_container(
                &container.id,
                Some(AttachContainerOptions::<String> {
                    stream: Some(true),
                    stdin: Some(true),
                    stdout: Some(true),
                    stderr: Some(true),
                    ..Default::default()
                }),
            )
            .await?;

        self.docker
            .start_container(&container.id, None::<StartContainerOptions>)
            .await?;

        let payload = stdin.unwrap_or_default();
        let writer = tokio::spawn(async move {
            if !payload.is_empty() {
                if let Err(err) = input.write_all(payload.as_bytes()).await {
                    log::debug!("container stdin closed before input was consumed: {}", err);
                }
            }
            let _ = input.shutdown().await;
        });

        let collector = tokio::spawn(async move {
            let mut stdout = String::new();
            let mut stderr = String::new();
            let mut output = output;
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message))
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message))
                    }
                    Ok(_) => {}
                    Err(err) => {
                        log::debug!("attach stream ended: {}", err);
                        break;
                    }
                }
            }
            (stdout, stderr)
        });

        let mut wait_stream = self
            .docker
            .wait_container(&container.id, None::<WaitContainerOptions>);

        let waited = tokio::select! {
            res = wait_stream.next() => Some(res),
            _ = cancel.cancelled() => None,
        };

        let (exit_code, timed_out) = match waited {
            Some(Some(Ok(response))) => (Some(response.status_code), false),
            // bollard surfaces a non-zero exit as a wait error carrying the code
            Some(Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. }))) => {
                (Some(code), false)
            }
            Some(Some(Err(err))) => {
                writer.abort();
                collector.abort();
                return Err(err.into());
            }
            Some(None) => (None, false),
            None => {
                log::warn!("container {} exceeded its budget, stopping it", container.id);
                let _ = self
                    .docker
                    .stop_container(&container.id, None::<StopContainerOptions>)
                    .await;
                (None, true)
            }
        };

        writer.abort();
        let (stdout, stderr) = match tokio::time::timeout(ATTACH_DRAIN_GRACE, collector).await {
            Ok(Ok(streams)) => streams,
            _ => {
                log::warn!("attach stream for container {} did not drain in time", container.id);
                (String::new(), String::new())
            }
        };

        Ok(StreamedOutput {
            stdout,
            stderr,
            exit_code,
            timed_out,
        })
    }
}
