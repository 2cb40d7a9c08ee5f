//! Declarative description of a synthetic topology.
//!
//! Used by the binary and by tests to assemble a pipeline out of the
//! built-in elements without writing wiring code:
//!
//! ```toml
//! frames = 100
//! frame_interval_ms = 0
//!
//! [[branches]]
//! [[branches.stages]]
//! kind = "passthrough"
//! mode = "thread_queue"
//! queue_depth = 3
//!
//! [[branches.stages]]
//! kind = "sink"
//! delay_ms = 2
//! ```
//!
//! More than one branch inserts a splitter behind the source.

use crate::config::{load_file, save_file};
use crate::error::Result;
use crate::pipeline::ThreadingMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Kind of built-in element a stage instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    #[default]
    Passthrough,
    Sink,
}

/// One stage of a branch and the connection feeding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub kind: StageKind,

    /// Threading mode of the connection into this stage
    pub mode: ThreadingMode,

    /// FIFO depth for `ThreadQueue`; pipeline default when absent
    pub queue_depth: Option<usize>,

    /// Artificial per-unit processing delay
    pub delay_ms: u64,

    /// Internal buffer size of a passthrough stage
    pub capacity: usize,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            kind: StageKind::Passthrough,
            mode: ThreadingMode::Direct,
            queue_depth: None,
            delay_ms: 0,
            capacity: 2,
        }
    }
}

impl StageConfig {
    pub fn sink(mode: ThreadingMode) -> Self {
        Self {
            kind: StageKind::Sink,
            mode,
            ..Default::default()
        }
    }

    pub fn passthrough(mode: ThreadingMode) -> Self {
        Self {
            kind: StageKind::Passthrough,
            mode,
            ..Default::default()
        }
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = Some(depth);
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// A chain of stages hanging off the source (or off one splitter output).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchConfig {
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

/// Whole synthetic topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Units emitted by the source before EOF
    pub frames: u64,

    /// Pause between source units
    pub frame_interval_ms: u64,

    /// Threading mode of the source -> splitter connection
    pub splitter_mode: ThreadingMode,

    pub branches: Vec<BranchConfig>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            frames: 100,
            frame_interval_ms: 0,
            splitter_mode: ThreadingMode::Direct,
            branches: vec![BranchConfig {
                stages: vec![
                    StageConfig::passthrough(ThreadingMode::ThreadQueue).with_queue_depth(3),
                    StageConfig::sink(ThreadingMode::ThreadQueue),
                ],
            }],
        }
    }
}

impl TopologyConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_file(path.as_ref())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_file(self, path.as_ref())
    }
}
