//! Element abstraction for the pipeline.
//!
//! An element is a processing stage: a source, a filter or a sink. The
//! engine never enumerates concrete stages; anything implementing
//! [`Element`] can be connected. Elements are shared between the threads of
//! their slots (`Arc<dyn Element>`), so every method takes `&self` and the
//! implementation provides its own interior mutability.

use crate::pipeline::status::Status;
use crate::pipeline::unit::DataUnit;

/// Capability set every processing stage exposes to the engine.
#[cfg_attr(test, mockall::automock)]
pub trait Element: Send + Sync {
    /// Push one unit into input slot `input`.
    ///
    /// Answer `InputFull` / `NoFreeBuffers` to apply backpressure and
    /// `Repeat` to have the same unit submitted again.
    fn submit_input(&self, data: &DataUnit, input: usize) -> Status;

    /// Pull the next unit from output slot `output`.
    ///
    /// `(None, Status::Ok)` or `(None, Status::Repeat)` means nothing is
    /// ready yet. `Status::Eof` ends the stream on that slot.
    fn query_output(&self, output: usize) -> (Option<DataUnit>, Status);

    /// Signal end of stream on input slot `input` and flush internal work.
    ///
    /// May answer `InputFull` until buffered output has been collected.
    fn drain(&self, input: usize) -> Status;

    fn input_slot_count(&self) -> usize;

    fn output_slot_count(&self) -> usize;

    fn freeze(&self) -> Status {
        Status::Ok
    }

    fn unfreeze(&self) -> Status {
        Status::Ok
    }

    /// Drop buffered, not yet delivered work without ending the stream.
    fn flush(&self) -> Status {
        Status::Ok
    }

    /// Rewind to the start of the stream. Called on pipeline restart while
    /// every slot is frozen.
    fn restart(&self) -> Status {
        Status::Ok
    }

    /// Human-readable per-stage statistics.
    fn display_result(&self) -> Option<String> {
        None
    }
}

/// Stable identity of an element handle, used to find its connector.
pub(crate) fn element_addr(element: &std::sync::Arc<dyn Element>) -> *const () {
    std::sync::Arc::as_ptr(element) as *const ()
}
