//! Binding between one element and its slots.
//!
//! The connector is the unit of start, stop, freeze and flush. It owns its
//! slots, holds the element, counts units in and out, and folds per-slot
//! end of stream into a single connector-level EOF reported to the pipeline.

use crate::pipeline::bridge::PipelineEvent;
use crate::pipeline::element::Element;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::executor::PipelineCore;
use crate::pipeline::id::{ConnectorId, SlotId};
use crate::pipeline::slot::{InputSlot, OutputSlot, SlotTiming};
use crate::pipeline::stats::ConnectorStats;
use crate::pipeline::status::Status;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub struct Connector {
    id: ConnectorId,
    element: Arc<dyn Element>,
    inputs: Vec<Arc<InputSlot>>,
    outputs: Vec<Arc<OutputSlot>>,
    pipeline: Weak<PipelineCore>,
    submitted: AtomicU64,
    polled: AtomicU64,
    /// Connector EOF has been reported for the current stream.
    eof_reported: AtomicBool,
}

impl Connector {
    pub(crate) fn new(
        id: ConnectorId,
        element: Arc<dyn Element>,
        pipeline: Weak<PipelineCore>,
        timing: SlotTiming,
    ) -> Arc<Self> {
        let input_count = element.input_slot_count();
        let output_count = element.output_slot_count();
        let source = input_count == 0;

        Arc::new_cyclic(|me: &Weak<Connector>| Self {
            id,
            inputs: (0..input_count)
                .map(|i| Arc::new(InputSlot::new(SlotId::input(id, i), me.clone(), timing)))
                .collect(),
            outputs: (0..output_count)
                .map(|i| {
                    Arc::new(OutputSlot::new(
                        SlotId::output(id, i),
                        me.clone(),
                        timing,
                        source,
                    ))
                })
                .collect(),
            element,
            pipeline,
            submitted: AtomicU64::new(0),
            polled: AtomicU64::new(0),
            eof_reported: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn id(&self) -> ConnectorId {
        self.id
    }

    pub fn element(&self) -> &Arc<dyn Element> {
        &self.element
    }

    pub fn inputs(&self) -> &[Arc<InputSlot>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Arc<OutputSlot>] {
        &self.outputs
    }

    pub fn input(&self, index: usize) -> Option<&Arc<InputSlot>> {
        self.inputs.get(index)
    }

    pub fn output(&self, index: usize) -> Option<&Arc<OutputSlot>> {
        self.outputs.get(index)
    }

    /// A stage without inputs has to drive itself.
    pub fn is_source(&self) -> bool {
        self.inputs.is_empty()
    }

    pub(crate) fn first_free_output(&self) -> Option<usize> {
        self.outputs.iter().position(|o| !o.is_wired())
    }

    /// Connectors fed directly by this one's outputs.
    pub(crate) fn downstream(&self) -> Vec<Arc<Connector>> {
        self.outputs
            .iter()
            .filter_map(|o| o.downstream())
            .filter_map(|i| i.connector())
            .collect()
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn polled(&self) -> u64 {
        self.polled.load(Ordering::Relaxed)
    }

    /// Units that made it through this stage: submitted, or polled for a source.
    pub fn frames(&self) -> u64 {
        if self.is_source() {
            self.polled()
        } else {
            self.submitted()
        }
    }

    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_polled(&self) {
        self.polled.fetch_add(1, Ordering::Relaxed);
    }

    /// True once every owned slot reached end of stream.
    pub fn is_eof(&self) -> bool {
        self.inputs.iter().all(|i| i.is_eof()) && self.outputs.iter().all(|o| o.is_eof())
    }

    /// True once every input has started draining.
    pub(crate) fn inputs_draining(&self) -> bool {
        self.inputs.iter().all(|i| i.is_draining())
    }

    /// Some direct output still has to be polled to reach its EOF.
    pub(crate) fn awaits_inline_poll(&self) -> bool {
        self.outputs.iter().any(|o| o.awaits_inline_poll())
    }

    /// Set every slot running; unconnected inputs end immediately.
    pub(crate) fn prepare(&self) {
        for input in &self.inputs {
            input.prepare();
        }
        for output in &self.outputs {
            output.prepare();
        }
        self.on_slot_eof();
    }

    /// Spawn the slot threads the connection modes call for.
    pub(crate) fn start(&self) -> PipelineResult<()> {
        for input in &self.inputs {
            input.start()?;
        }
        for output in &self.outputs {
            output.start()?;
        }
        let threads = self.inputs.iter().filter(|i| i.has_thread()).count()
            + self.outputs.iter().filter(|o| o.has_thread()).count();
        tracing::debug!(connector = %self.id, threads, "Connector started");
        Ok(())
    }

    pub(crate) fn request_stop(&self) {
        for input in &self.inputs {
            input.request_stop();
        }
        for output in &self.outputs {
            output.request_stop();
        }
    }

    pub(crate) fn join(&self) {
        for input in &self.inputs {
            input.join();
        }
        for output in &self.outputs {
            output.join();
        }
    }

    /// Give the element a last drain on every input that never saw EOF, so
    /// internally buffered work is flushed before teardown.
    pub(crate) fn drain_pending_inputs(&self) {
        for input in &self.inputs {
            if input.claim_drain() {
                let status = self.element.drain(input.id().index());
                tracing::debug!(slot = %input.id(), ?status, "Drained input on stop");
            }
        }
    }

    /// Stop threads, join them and drain what is left. The pipeline runs
    /// these phases across all connectors at once instead.
    #[cfg(test)]
    pub(crate) fn stop(&self) {
        self.request_stop();
        self.join();
        self.drain_pending_inputs();
    }

    /// Poll every direct output once on the calling thread.
    ///
    /// Returns `Eof` if any of them reports it, `Ok` if a unit moved and
    /// `Repeat` otherwise.
    pub fn poll_all(&self) -> Status {
        let mut moved = false;
        let mut eof = false;
        for output in self.outputs.iter().filter(|o| o.is_polled_inline()) {
            match output.poll() {
                Status::Ok => moved = true,
                Status::Eof => eof = true,
                _ => {}
            }
        }
        if eof {
            Status::Eof
        } else if moved {
            Status::Ok
        } else {
            Status::Repeat
        }
    }

    pub(crate) fn freeze(&self) {
        for input in &self.inputs {
            input.freeze();
        }
        for output in &self.outputs {
            output.freeze();
        }
        self.forward("freeze", self.element.freeze());
    }

    pub(crate) fn unfreeze(&self) {
        for input in &self.inputs {
            input.unfreeze();
        }
        for output in &self.outputs {
            output.unfreeze();
        }
        self.forward("unfreeze", self.element.unfreeze());
    }

    /// Drop buffered units on every output, then in the element.
    pub(crate) fn flush(&self) -> usize {
        let dropped: usize = self.outputs.iter().map(|o| o.flush()).sum();
        self.forward("flush", self.element.flush());
        if dropped > 0 {
            tracing::debug!(connector = %self.id, dropped, "Flushed queued units");
        }
        dropped
    }

    /// Tell every slot to drop the unit it may be forwarding.
    pub(crate) fn begin_rewind(&self) {
        for input in &self.inputs {
            input.begin_rewind();
        }
        for output in &self.outputs {
            output.begin_rewind();
        }
    }

    /// Wait until no slot thread is in the middle of a step.
    pub(crate) fn quiesce(&self) {
        for input in &self.inputs {
            input.quiesce();
        }
        for output in &self.outputs {
            output.quiesce();
        }
    }

    /// Rewind the connector for a new stream. Slots must be frozen and
    /// quiesced.
    pub(crate) fn restart(&self) {
        self.forward("restart", self.element.restart());
        for output in &self.outputs {
            output.restart();
        }
        for input in &self.inputs {
            input.restart();
        }
        self.submitted.store(0, Ordering::Relaxed);
        self.polled.store(0, Ordering::Relaxed);
        self.eof_reported.store(false, Ordering::Release);
    }

    fn forward(&self, operation: &str, status: Status) {
        if status.is_error() {
            tracing::warn!(connector = %self.id, operation, ?status, "Element rejected request");
        }
    }

    pub(crate) fn on_slot_eof(&self) {
        if !self.is_eof() || self.eof_reported.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(connector = %self.id, submitted = self.submitted(), "Connector reached EOF");
        if let Some(pipeline) = self.pipeline.upgrade() {
            pipeline.emit(PipelineEvent::ConnectorEof(self.id));
            pipeline.on_eof();
        }
    }

    pub(crate) fn on_slot_failed(&self, slot: SlotId, status: Status) {
        if let Some(pipeline) = self.pipeline.upgrade() {
            pipeline.emit(PipelineEvent::SlotFailed { slot, status });
        }
    }

    pub(crate) fn on_slot_stalled(&self, slot: SlotId) {
        if let Some(pipeline) = self.pipeline.upgrade() {
            pipeline.emit(PipelineEvent::SlotStalled { slot });
        }
    }

    pub fn display_result(&self) -> Option<String> {
        self.element.display_result()
    }

    pub fn stats(&self) -> ConnectorStats {
        ConnectorStats {
            id: self.id,
            submitted: self.submitted(),
            polled: self.polled(),
            eof: self.is_eof(),
            queues: self
                .outputs
                .iter()
                .filter_map(|o| o.queue_stats().map(|q| (o.id(), q)))
                .collect(),
            result: self.display_result(),
        }
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("id", &self.id)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("eof", &self.is_eof())
            .finish()
    }
}
