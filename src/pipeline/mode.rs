//! Slot directions and connection threading modes.

use serde::{Deserialize, Serialize};

/// Whether a slot feeds an element or drains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotDirection {
    Input,
    Output,
}

/// How a connection between an output slot and an input slot is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadingMode {
    /// No thread of its own; runs on whichever thread pushes or polls.
    #[default]
    Direct,
    /// The input side owns a thread that pulls synchronously from upstream.
    ThreadPoll,
    /// Both sides own a thread, decoupled by a bounded FIFO.
    ThreadQueue,
}

impl ThreadingMode {
    /// Whether the connection buffers through a queue.
    #[inline]
    pub fn is_queued(self) -> bool {
        self == ThreadingMode::ThreadQueue
    }
}

/// Lifecycle of a single slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    Idle = 0,
    Running = 1,
    Eof = 2,
    Stopped = 3,
}

impl SlotState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => SlotState::Running,
            2 => SlotState::Eof,
            3 => SlotState::Stopped,
            _ => SlotState::Idle,
        }
    }
}
