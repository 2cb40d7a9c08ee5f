//! Pipeline-specific error types.

use crate::pipeline::executor::PipelineState;
use crate::pipeline::id::{ConnectorId, SlotId};
use crate::pipeline::status::Status;
use thiserror::Error;

/// Errors returned synchronously from pipeline lifecycle and wiring calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Cannot {operation} while pipeline is {state:?}")]
    WrongState {
        operation: &'static str,
        state: PipelineState,
    },

    #[error("Element is not part of this pipeline")]
    UnknownElement,

    #[error("Slot index {index} out of range for {connector} ({count} slots)")]
    SlotOutOfRange {
        connector: ConnectorId,
        index: usize,
        count: usize,
    },

    #[error("Slot {0:?} is already connected")]
    SlotAlreadyConnected(SlotId),

    #[error("Connecting {downstream} after {upstream} would create a cycle")]
    CycleDetected {
        upstream: ConnectorId,
        downstream: ConnectorId,
    },

    #[error("Element has no free output slot to wire from {0}")]
    NoFreeOutput(ConnectorId),

    #[error("Failed to spawn thread for {slot:?}: {message}")]
    ThreadSpawn { slot: SlotId, message: String },

    #[error("Element returned {0:?}")]
    Element(Status),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
