//! Engine configuration with layered defaults
//!
//! Every knob has a serde-level default so a minimal YAML file (or none at
//! all) yields a working engine, while deployments can tighten timeouts, size
//! the worker pool to host capacity, or switch on container isolation per
//! environment. Validation runs once at dispatcher construction; a zero
//! timeout or an empty pool is a configuration bug, not something to discover
//! mid-execution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Wall-clock budget for the Run phase, milliseconds.
    #[serde(default = "default_run_timeout_ms")]
    pub run_timeout_ms: u64,
    /// Wall-clock budget for the Compile phase, independent of the run budget.
    #[serde(default = "default_compile_timeout_ms")]
    pub compile_timeout_ms: u64,
    /// Executions allowed to run concurrently.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Executions allowed in flight overall (running + queued); beyond this
    /// the dispatcher rejects instead of queuing further.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
    #[serde(default)]
    pub isolation: IsolationConfig,
    #[serde(default)]
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationConfig {
    /// When enabled, one-shot executions run inside a disposable per-language
    /// container with the scratch directory bind-mounted.
    #[serde(default)]
    pub enabled: bool,
    /// Per-language image overrides, keyed by canonical language name.
    #[serde(default)]
    pub images: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Budget for one interactive round when the program never emits the
    /// framing sentinel.
    #[serde(default = "default_round_timeout_ms")]
    pub round_timeout_ms: u64,
    /// Line an interactive program prints to mark the end of a round; the
    /// sentinel itself is stripped from the returned stdout.
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
    /// Sessions idle longer than this are killed and evicted.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Cadence of the eviction sweeper.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("codecell")
}

fn default_run_timeout_ms() -> u64 {
    5_000
}

fn default_compile_timeout_ms() -> u64 {
    10_000
}

fn default_max_concurrent() -> usize {
    8
}

fn default_max_pending() -> usize {
    32
}

fn default_round_timeout_ms() -> u64 {
    1_000
}

fn default_sentinel() -> String {
    "@@done@@".to_string()
}

fn default_idle_timeout_ms() -> u64 {
    300_000
}

fn default_sweep_interval_ms() -> u64 {
    30_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            scratch_dir: default_scratch_dir(),
            run_timeout_ms: default_run_timeout_ms(),
            compile_timeout_ms: default_compile_timeout_ms(),
            max_concurrent: default_max_concurrent(),
            max_pending: default_max_pending(),
            isolation: IsolationConfig::default(),
            session: SessionSettings::default(),
        }
    }
}

impl Default for IsolationConfig {
    fn default() -> Self {
        IsolationConfig {
            enabled: false,
            images: HashMap::new(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            round_timeout_ms: default_round_timeout_ms(),
            sentinel: default_sentinel(),
            idle_timeout_ms: default_idle_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_yaml::from_str(&raw)
            .map_err(|e| EngineError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.run_timeout_ms == 0 || self.compile_timeout_ms == 0 {
            return Err(EngineError::Config("timeouts must be non-zero".to_string()));
        }
        if self.max_concurrent == 0 {
            return Err(EngineError::Config("max_concurrent must be at least 1".to_string()));
        }
        if self.max_pending < self.max_concurrent {
            return Err(EngineError::Config(
                "max_pending must be at least max_concurrent".to_string(),
            ));
        }
        if self.session.round_timeout_ms == 0 || self.session.idle_timeout_ms == 0 {
            return Err(EngineError::Config("session timeouts must be non-zero".to_string()));
        }
        if self.session.sentinel.is_empty() || self.session.sentinel.contains('\n') {
            return Err(EngineError::Config(
                "session sentinel must be a single non-empty line".to_string(),
            ));
        }
        Ok(())
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }
}

impl SessionSettings {
    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
