//! Configuration module for framepipe
//!
//! This module handles engine configuration:
//! - Slot timing (poll/submit timeouts, back-off interval)
//! - Queue defaults for `ThreadQueue` connections
//! - The optional stall budget for stuck elements
//! - Logging defaults used by the binary
//! - The demo binary's file, [`DemoConfig`], which adds a [`TopologyConfig`]
//!
//! Files are TOML (`.toml`) or JSON (any other extension).
//!
//! # Example
//!
//! ```ignore
//! use framepipe::config::PipelineConfig;
//!
//! let mut config = PipelineConfig::load_or_default("framepipe.toml");
//! config.stall.max_stall_ms = Some(2_000);
//! config.save("framepipe.toml")?;
//! ```

pub mod topology;

pub use topology::*;

use crate::error::{FramePipeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default timeout for a consumer waiting on upstream output, in milliseconds
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 50;

/// Default timeout passed along with synchronous pushes, in milliseconds
pub const DEFAULT_SUBMIT_TIMEOUT_MS: u64 = 50;

/// Default sleep between retries when nothing is ready, in milliseconds
pub const DEFAULT_BACKOFF_MS: u64 = 1;

/// Default depth of a `ThreadQueue` FIFO
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

/// Default tracing filter directive
pub const DEFAULT_LOG_FILTER: &str = "info,framepipe=debug";

/// Timing knobs shared by every slot loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How long a pulling input slot waits on upstream output
    pub poll_timeout_ms: u64,

    /// Timeout handed to synchronous pushes (upper bound of one retry wait)
    pub submit_timeout_ms: u64,

    /// Sleep between retries on "nothing ready" or "input full"
    pub backoff_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            submit_timeout_ms: DEFAULT_SUBMIT_TIMEOUT_MS,
            backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

impl TimingConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms.max(1))
    }
}

/// Queue defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Depth used by callers that do not pick one explicitly
    pub default_depth: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// Bound on how long an input slot keeps retrying a full element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StallConfig {
    /// `None` retries forever
    pub max_stall_ms: Option<u64>,
}

impl StallConfig {
    pub fn max_stall(&self) -> Option<Duration> {
        self.max_stall_ms.map(Duration::from_millis)
    }
}

/// Logging defaults for the binary. `RUST_LOG` overrides `filter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,

    /// Directory for a daily rolling log file, if any
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            directory: None,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub stall: StallConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stall budget
    pub fn with_max_stall(mut self, budget: Duration) -> Self {
        self.stall.max_stall_ms = Some(budget.as_millis() as u64);
        self
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_file(path.as_ref())
    }

    /// Load a configuration file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default pipeline config: {}", e);
                Self::default()
            }
        }
    }

    /// Save the configuration to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_file(self, path.as_ref())
    }
}

/// Configuration file of the demo binary: engine settings plus the
/// topology to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub pipeline: PipelineConfig,

    pub topology: TopologyConfig,

    /// How long to wait for the pipeline to reach EOF before stopping it
    pub run_timeout_secs: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            topology: TopologyConfig::default(),
            run_timeout_secs: 30,
        }
    }
}

impl DemoConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_file(path.as_ref())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_file(self, path.as_ref())
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
}

pub(crate) fn load_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        FramePipeError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;

    if is_toml(path) {
        toml::from_str(&content).map_err(|e| {
            FramePipeError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    } else {
        serde_json::from_str(&content).map_err(|e| {
            FramePipeError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }
}

pub(crate) fn save_file<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FramePipeError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }
    }

    let content = if is_toml(path) {
        toml::to_string_pretty(value)
            .map_err(|e| FramePipeError::Serialization(e.to_string()))?
    } else {
        serde_json::to_string_pretty(value)
            .map_err(|e| FramePipeError::Serialization(e.to_string()))?
    };

    std::fs::write(path, content).map_err(|e| {
        FramePipeError::Config(format!("Failed to write config file {:?}: {}", path, e))
    })
}
