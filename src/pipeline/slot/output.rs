use super::{InputSlot, SlotCore, SlotTiming};
use crate::pipeline::connector::Connector;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::id::SlotId;
use crate::pipeline::mode::{SlotState, ThreadingMode};
use crate::pipeline::queue::{FrameQueue, QueueStats};
use crate::pipeline::status::Status;
use crate::pipeline::unit::DataUnit;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

#[derive(Default)]
struct OutputLink {
    mode: ThreadingMode,
    queue: Option<Arc<FrameQueue>>,
    downstream: Option<Arc<InputSlot>>,
}

/// Drives data out of an element.
///
/// In `ThreadQueue` mode the slot owns a thread polling the element into a
/// bounded FIFO. Otherwise every unit is pushed synchronously into the
/// downstream input slot, or handed out on demand through
/// [`OutputSlot::query_output`].
pub struct OutputSlot {
    core: SlotCore,
    link: RwLock<OutputLink>,
    /// The owning element has no inputs, so nothing else will ever poll it.
    source: bool,
    seq: AtomicU64,
    /// Serialises element queries so one connection stays strictly ordered.
    poll_lock: Mutex<()>,
}

impl OutputSlot {
    pub(crate) fn new(
        id: SlotId,
        connector: Weak<Connector>,
        timing: SlotTiming,
        source: bool,
    ) -> Self {
        Self {
            core: SlotCore::new(id, connector, timing),
            link: RwLock::new(OutputLink::default()),
            source,
            seq: AtomicU64::new(0),
            poll_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> SlotId {
        self.core.id()
    }

    pub fn mode(&self) -> ThreadingMode {
        self.link.read().mode
    }

    pub fn state(&self) -> SlotState {
        self.core.state()
    }

    pub fn is_eof(&self) -> bool {
        self.core.is_eof()
    }

    pub fn is_frozen(&self) -> bool {
        self.core.is_frozen()
    }

    pub fn is_failed(&self) -> bool {
        self.core.is_failed()
    }

    pub fn is_wired(&self) -> bool {
        self.link.read().downstream.is_some()
    }

    pub fn downstream(&self) -> Option<Arc<InputSlot>> {
        self.link.read().downstream.clone()
    }

    pub(crate) fn wire(&self, downstream: Arc<InputSlot>, mode: ThreadingMode, depth: usize) {
        let mut link = self.link.write();
        link.mode = mode;
        link.queue = mode.is_queued().then(|| Arc::new(FrameQueue::new(depth)));
        link.downstream = Some(downstream);
    }

    /// Whether this slot runs its own poll loop.
    ///
    /// True for queued connections and for every output of a source
    /// element, which has no input side to drive it.
    pub fn is_self_driven(&self) -> bool {
        self.source || self.mode().is_queued()
    }

    /// Whether [`Connector::poll_all`] is responsible for this slot.
    pub(crate) fn is_polled_inline(&self) -> bool {
        !self.source && self.mode() == ThreadingMode::Direct
    }

    /// Still expecting output that only an inline poll will collect.
    pub(crate) fn awaits_inline_poll(&self) -> bool {
        self.is_polled_inline() && !self.core.is_eof() && !self.core.is_failed()
    }

    pub fn queue_stats(&self) -> Option<QueueStats> {
        self.link.read().queue.as_ref().map(|q| q.stats())
    }

    pub(crate) fn prepare(&self) {
        self.core.set_state(SlotState::Running);
    }

    pub(crate) fn start(self: &Arc<Self>) -> PipelineResult<()> {
        if self.is_self_driven() {
            let slot = Arc::clone(self);
            self.core.spawn(move || slot.run())?;
        }
        Ok(())
    }

    fn run(self: Arc<Self>) {
        tracing::debug!(slot = %self.id(), mode = ?self.mode(), "Output slot thread started");
        while !self.core.stop_requested() {
            let busy = self.core.busy();
            if self.core.is_parked() {
                drop(busy);
                self.core.back_off();
                continue;
            }
            let status = self.poll();
            drop(busy);
            match status {
                Status::Ok | Status::Eof | Status::Stopped => {}
                _ => self.core.back_off(),
            }
        }
        tracing::debug!(slot = %self.id(), "Output slot thread exiting");
    }

    /// Query the element once and forward whatever it produced.
    ///
    /// Returns `Ok` when a unit moved, `Repeat` when nothing was ready and
    /// `Eof` once the stream on this slot has ended.
    pub fn poll(&self) -> Status {
        let Some(_guard) = self.poll_lock.try_lock() else {
            return Status::Repeat;
        };
        if self.core.stop_requested() {
            return Status::Stopped;
        }
        if self.core.is_failed() {
            return Status::Fail;
        }
        if self.core.is_eof() {
            return Status::Eof;
        }
        if self.core.is_frozen() {
            return Status::Repeat;
        }
        let Some(connector) = self.core.connector() else {
            return Status::Stopped;
        };

        let (data, status) = connector.element().query_output(self.id().index());
        let produced = data.is_some();
        if let Some(unit) = data {
            connector.record_polled();
            let delivered = self.deliver(unit);
            if delivered == Status::Stopped {
                return Status::Stopped;
            }
        }

        match status {
            Status::Eof => {
                self.finish(&connector);
                Status::Eof
            }
            s if s.is_ok() || s.is_retryable() || s == Status::NeedMoreInput => {
                if produced {
                    Status::Ok
                } else {
                    Status::Repeat
                }
            }
            other => {
                self.fail(&connector, other);
                other
            }
        }
    }

    /// Consumer-facing pull used by the downstream input slot's thread.
    ///
    /// Queued connections dequeue with `timeout` and answer `Repeat` when it
    /// expires. Other modes query the element directly, without buffering.
    pub fn query_output(&self, timeout: Duration) -> (Option<DataUnit>, Status) {
        let queue = self.link.read().queue.clone();
        if let Some(queue) = queue {
            return match queue.pop(timeout) {
                Some((_, Some(unit))) => (Some(unit), Status::Ok),
                Some((_, None)) => (None, Status::Eof),
                None => (None, Status::Repeat),
            };
        }

        let _guard = self.poll_lock.lock();
        if self.core.is_eof() {
            return (None, Status::Eof);
        }
        if self.core.is_failed() {
            return (None, Status::Fail);
        }
        if self.core.is_frozen() || self.core.stop_requested() {
            return (None, Status::Repeat);
        }
        let Some(connector) = self.core.connector() else {
            return (None, Status::Stopped);
        };

        let (data, status) = connector.element().query_output(self.id().index());
        if data.is_some() {
            connector.record_polled();
        }
        match status {
            Status::Eof => {
                // A unit delivered together with EOF goes out first; the next
                // pull reports the end of stream from the flag.
                self.mark_eof(&connector);
                match data {
                    Some(unit) => (Some(unit), Status::Ok),
                    None => (None, Status::Eof),
                }
            }
            s if s.is_ok() || s.is_retryable() || s == Status::NeedMoreInput => match data {
                Some(unit) => (Some(unit), Status::Ok),
                None => (None, Status::Repeat),
            },
            other => {
                self.fail(&connector, other);
                (data, other)
            }
        }
    }

    fn deliver(&self, unit: DataUnit) -> Status {
        let (queue, downstream) = {
            let link = self.link.read();
            (link.queue.clone(), link.downstream.clone())
        };
        let timing = *self.core.timing();

        if let Some(queue) = queue {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            loop {
                if self.core.stop_requested() {
                    return Status::Stopped;
                }
                if self.core.is_rewinding() {
                    tracing::trace!(slot = %self.id(), seq, "Dropping unit of the previous stream");
                    return Status::Stopped;
                }
                if queue.push(seq, unit.clone(), timing.poll_timeout) {
                    tracing::trace!(slot = %self.id(), seq, "Queued unit");
                    return Status::Ok;
                }
            }
        }

        match downstream {
            Some(input) => input.submit_input(Some(unit), timing.submit_timeout, true),
            None => {
                tracing::trace!(slot = %self.id(), "Unwired output, dropping unit");
                Status::Ok
            }
        }
    }

    fn finish(&self, connector: &Arc<Connector>) {
        let (queue, downstream) = {
            let link = self.link.read();
            (link.queue.clone(), link.downstream.clone())
        };
        if let Some(queue) = queue {
            queue.push_eof(self.seq.fetch_add(1, Ordering::Relaxed));
        } else if let Some(input) = downstream {
            input.submit_input(None, self.core.timing().submit_timeout, true);
        }
        self.mark_eof(connector);
    }

    fn mark_eof(&self, connector: &Arc<Connector>) {
        if self.core.is_eof() {
            return;
        }
        tracing::debug!(slot = %self.id(), "Output reached EOF");
        self.core.set_eof();
        connector.on_slot_eof();
    }

    fn fail(&self, connector: &Arc<Connector>, status: Status) {
        tracing::error!(slot = %self.id(), ?status, "Element failed to produce output");
        self.core.set_failed();
        connector.on_slot_failed(self.id(), status);
    }

    pub(crate) fn freeze(&self) {
        self.core.set_frozen(true);
    }

    pub(crate) fn unfreeze(&self) {
        self.core.set_frozen(false);
    }

    pub(crate) fn begin_rewind(&self) {
        self.core.begin_rewind();
    }

    pub(crate) fn quiesce(&self) {
        self.core.quiesce();
    }

    /// Drop buffered units without touching end of stream.
    pub(crate) fn flush(&self) -> usize {
        let queue = self.link.read().queue.clone();
        queue.map(|q| q.flush()).unwrap_or(0)
    }

    /// Empty the FIFO and clear eof so the stream can run again.
    pub(crate) fn restart(&self) {
        let queue = self.link.read().queue.clone();
        if let Some(queue) = queue {
            queue.reset();
        }
        self.seq.store(0, Ordering::Relaxed);
        self.core.rewind();
    }

    pub(crate) fn request_stop(&self) {
        self.core.request_stop();
    }

    pub(crate) fn join(&self) {
        self.core.join();
    }

    pub(crate) fn has_thread(&self) -> bool {
        self.core.has_thread()
    }
}

impl std::fmt::Debug for OutputSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSlot")
            .field("id", &self.id())
            .field("mode", &self.mode())
            .field("state", &self.state())
            .finish()
    }
}
