//! Result vocabulary shared by elements and slots.
//!
//! Elements answer every call with a [`Status`]. Most of the variants are
//! flow control rather than failure: the slots retry the transient ones
//! locally and only surface state transitions to the pipeline.

use crate::pipeline::error::{PipelineError, PipelineResult};

/// Outcome of an element or slot operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The call succeeded.
    Ok,
    /// The stream has ended on this slot.
    Eof,
    /// The element cannot accept input right now; retry later.
    InputFull,
    /// The element ran out of internal buffers; retry later.
    NoFreeBuffers,
    /// Input was consumed but no output is available yet.
    NeedMoreInput,
    /// Nothing was produced; the same call should be repeated.
    Repeat,
    /// Input was accepted and the stream format changed.
    ResolutionChanged,
    /// The operation is not valid in the current state.
    WrongState,
    /// Generic failure.
    Fail,
    /// Backpressure outlasted the configured stall budget.
    Stalled,
    /// The slot was asked to stop before the operation completed.
    Stopped,
}

impl Status {
    /// `Ok` or `ResolutionChanged`: the call did what was asked.
    #[inline]
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok | Status::ResolutionChanged)
    }

    /// Backpressure or repeat signals that the slot loops retry.
    #[inline]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Status::InputFull | Status::NoFreeBuffers | Status::Repeat
        )
    }

    /// Values that steer the state machine without being failures.
    #[inline]
    pub fn is_flow_control(self) -> bool {
        matches!(self, Status::Eof | Status::NeedMoreInput)
    }

    /// Anything that is neither success, retryable nor flow control.
    #[inline]
    pub fn is_error(self) -> bool {
        !(self.is_ok() || self.is_retryable() || self.is_flow_control() || self == Status::Stopped)
    }

    /// Map error statuses onto [`PipelineError::Element`].
    pub fn into_result(self) -> PipelineResult<Status> {
        if self.is_error() {
            Err(PipelineError::Element(self))
        } else {
            Ok(self)
        }
    }
}
