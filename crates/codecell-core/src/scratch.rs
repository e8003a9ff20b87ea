//! Temp-artifact management for the shared scratch directory
//!
//! Every execution owns a [`TempArtifact`]: a uniquely named source file (and,
//! for compiled languages, the binary or class file the toolchain produces)
//! inside one scratch directory shared by all concurrent executions. Safety
//! under concurrency rests entirely on the per-execution token being globally
//! unique; no locking guards the directory. Deletion is best effort: a failed
//! cleanup is logged and never changes the reported execution result.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::language::Language;

#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Creates the scratch directory if it does not exist yet.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(ScratchDir { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocates a collision-free artifact identity. Nothing touches the
    /// filesystem until the source is written.
    pub fn allocate(&self, language: Language) -> TempArtifact {
        let token = Uuid::new_v4().simple().to_string();
        TempArtifact {
            root: self.root.clone(),
            token,
            language,
        }
    }
}

/// Filesystem paths exclusively owned by a single execution.
#[derive(Debug, Clone)]
pub struct TempArtifact {
    root: PathBuf,
    token: String,
    language: Language,
}

impl TempArtifact {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Java only: the class name the source must declare, because the
    /// toolchain requires the file name to equal the public class name.
    pub fn class_name(&self) -> String {
        format!("Main_{}", self.token)
    }

    /// Source file name within the scratch directory.
    pub fn source_name(&self) -> String {
        match self.language {
            Language::Java => format!("{}.java", self.class_name()),
            other => format!("snippet_{}.{}", self.token, other.extension()),
        }
    }

    /// Produced-artifact file name for compiled languages.
    pub fn binary_name(&self) -> Option<String> {
        match self.language {
            Language::C | Language::Cpp => Some(format!("snippet_{}", self.token)),
            Language::Java => Some(format!("{}.class", self.class_name())),
            _ => None,
        }
    }

    pub fn source_path(&self) -> PathBuf {
        self.root.join(self.source_name())
    }

    pub fn binary_path(&self) -> Option<PathBuf> {
        self.binary_name().map(|name| self.root.join(name))
    }

    pub async fn write_source(&self, code: &str) -> Result<(), EngineError> {
        let mut file = tokio::fs::File::create(self.source_path()).await?;
        file.write_all(code.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Best-effort removal of the source and any produced artifact.
    pub async fn cleanup(&self) {
        if let Err(err) = tokio::fs::remove_file(self.source_path()).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                log::warn!(
                    "failed to remove source artifact {}: {}",
                    self.source_path().display(),
                    err
                );
            }
        }
        if let Some(binary) = self.binary_path() {
            if let Err(err) = tokio::fs::remove_file(&binary).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("failed to remove binary artifact {}: {}", binary.display(), err);
                }
            }
        }
    }
}
