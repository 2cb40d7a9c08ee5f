use super::{OutputSlot, SlotCore, SlotTiming};
use crate::pipeline::connector::Connector;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::id::SlotId;
use crate::pipeline::mode::{SlotState, ThreadingMode};
use crate::pipeline::status::Status;
use crate::pipeline::unit::DataUnit;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

#[derive(Default)]
struct InputLink {
    mode: ThreadingMode,
    upstream: Option<Weak<OutputSlot>>,
}

/// Drives data into an element.
///
/// Handles backpressure by retrying, optionally polling the element's own
/// outputs inline so a single-threaded chain cannot deadlock on a full
/// internal queue. A `None` unit drains the element and ends the stream.
pub struct InputSlot {
    core: SlotCore,
    link: RwLock<InputLink>,
    /// Set once a drain has begun; guards against draining twice.
    draining: AtomicBool,
}

impl InputSlot {
    pub(crate) fn new(id: SlotId, connector: Weak<Connector>, timing: SlotTiming) -> Self {
        Self {
            core: SlotCore::new(id, connector, timing),
            link: RwLock::new(InputLink::default()),
            draining: AtomicBool::new(false),
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
        self.link.read().upstream.is_some()
    }

    pub(crate) fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub(crate) fn connector(&self) -> Option<Arc<Connector>> {
        self.core.connector()
    }

    /// Claim the end-of-stream for a teardown drain. True when the caller
    /// must call the element's drain for this slot itself.
    pub(crate) fn claim_drain(&self) -> bool {
        self.is_wired() && !self.draining.swap(true, Ordering::AcqRel)
    }

    pub fn upstream(&self) -> Option<Arc<OutputSlot>> {
        self.link.read().upstream.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn wire(&self, upstream: &Arc<OutputSlot>, mode: ThreadingMode) {
        let mut link = self.link.write();
        link.mode = mode;
        link.upstream = Some(Arc::downgrade(upstream));
    }

    /// Whether this slot pulls from upstream on a thread of its own.
    ///
    /// `ThreadPoll` connections fed by a source are pushed by the source's
    /// thread instead, so only one thread ever queries that element.
    pub fn needs_thread(&self) -> bool {
        match self.mode() {
            ThreadingMode::ThreadQueue => true,
            ThreadingMode::ThreadPoll => self
                .upstream()
                .is_some_and(|upstream| !upstream.is_self_driven()),
            ThreadingMode::Direct => false,
        }
    }

    /// Enter `Running`. An unconnected input ends its stream right away so
    /// it cannot hold back the element's EOF.
    pub(crate) fn prepare(&self) {
        self.core.set_state(SlotState::Running);
        if !self.is_wired() {
            tracing::warn!(slot = %self.id(), "Input slot is not connected, treating as ended");
            self.draining.store(true, Ordering::Release);
            self.core.set_eof();
        }
    }

    pub(crate) fn start(self: &Arc<Self>) -> PipelineResult<()> {
        if self.is_wired() && self.needs_thread() {
            let slot = Arc::clone(self);
            self.core.spawn(move || slot.run())?;
        }
        Ok(())
    }

    fn run(self: Arc<Self>) {
        tracing::debug!(slot = %self.id(), mode = ?self.mode(), "Input slot thread started");
        let timing = *self.core.timing();
        let queued = self.mode().is_queued();
        while !self.core.stop_requested() {
            let busy = self.core.busy();
            // A failed slot keeps pulling and discarding so the upstream
            // element, and any sibling branch it feeds, is not blocked.
            if self.core.is_frozen() || self.core.is_eof() || self.is_draining() {
                drop(busy);
                self.core.back_off();
                continue;
            }
            let Some(upstream) = self.upstream() else {
                drop(busy);
                self.core.back_off();
                continue;
            };
            let idle = match upstream.query_output(timing.poll_timeout) {
                (Some(unit), _) => {
                    self.submit_input(Some(unit), timing.submit_timeout, false);
                    false
                }
                (None, Status::Eof) => {
                    self.submit_input(None, timing.submit_timeout, false);
                    false
                }
                (None, _) => !queued,
            };
            drop(busy);
            if idle {
                self.core.back_off();
            }
        }
        tracing::debug!(slot = %self.id(), "Input slot thread exiting");
    }

    /// Push one unit into the element, or drain it when `data` is `None`.
    ///
    /// Backpressure is retried until the element accepts the unit, stop is
    /// requested or the stall budget runs out. With `poll_inline` the
    /// element's direct outputs are polled between retries instead of
    /// sleeping. The direct outputs are always polled once afterwards.
    pub fn submit_input(
        &self,
        data: Option<DataUnit>,
        timeout: Duration,
        poll_inline: bool,
    ) -> Status {
        let Some(unit) = data else {
            return self.drain(timeout, poll_inline);
        };
        if self.core.is_failed() {
            return Status::Fail;
        }
        if self.is_draining() {
            tracing::warn!(slot = %self.id(), "Unit arrived after end of stream, discarding");
            return Status::Eof;
        }
        let Some(connector) = self.core.connector() else {
            return Status::Stopped;
        };
        let element = connector.element();
        let index = self.id().index();
        let wait = self.core.timing().backoff.min(timeout.max(Duration::from_millis(1)));
        let mut blocked_since: Option<Instant> = None;

        let status = loop {
            if self.core.stop_requested() {
                break Status::Stopped;
            }
            if self.core.is_rewinding() {
                tracing::trace!(slot = %self.id(), pts = ?unit.pts(), "Dropping unit of the previous stream");
                break Status::Stopped;
            }
            // A unit pulled just before a freeze waits here for the unfreeze.
            if self.core.is_frozen() {
                blocked_since = None;
                self.core.back_off();
                continue;
            }
            match element.submit_input(&unit, index) {
                s if s.is_ok() => {
                    connector.record_submitted();
                    tracing::trace!(slot = %self.id(), pts = ?unit.pts(), "Submitted unit");
                    break s;
                }
                Status::NeedMoreInput => break Status::NeedMoreInput,
                Status::InputFull | Status::NoFreeBuffers => {
                    let since = *blocked_since.get_or_insert_with(Instant::now);
                    if self.stall_exceeded(since) {
                        self.stall(&connector);
                        break Status::Stalled;
                    }
                    self.wait_for_room(&connector, poll_inline, wait);
                }
                Status::Repeat => continue,
                other => {
                    tracing::error!(slot = %self.id(), status = ?other, "Element rejected input");
                    self.core.set_failed();
                    connector.on_slot_failed(self.id(), other);
                    break other;
                }
            }
        };

        if status != Status::Stopped {
            connector.poll_all();
        }
        status
    }

    /// End the stream on this slot.
    ///
    /// Calls the element's drain until it stops answering "input full",
    /// then, if every input of the element has ended, keeps polling the
    /// direct outputs until they report EOF so the tail of the stream and
    /// the EOF itself travel downstream on this thread.
    fn drain(&self, timeout: Duration, poll_inline: bool) -> Status {
        // A failed connection never reports end of stream.
        if self.core.is_failed() {
            return Status::Fail;
        }
        if self.draining.swap(true, Ordering::AcqRel) {
            return Status::Eof;
        }
        let Some(connector) = self.core.connector() else {
            return Status::Stopped;
        };
        tracing::debug!(slot = %self.id(), "Draining element input");
        let element = connector.element();
        let index = self.id().index();
        let wait = self.core.timing().backoff.min(timeout.max(Duration::from_millis(1)));
        let mut blocked_since: Option<Instant> = None;

        loop {
            if self.core.stop_requested() || self.core.is_rewinding() {
                return Status::Stopped;
            }
            match element.drain(index) {
                Status::InputFull | Status::NoFreeBuffers | Status::Repeat => {
                    let since = *blocked_since.get_or_insert_with(Instant::now);
                    if self.stall_exceeded(since) {
                        self.stall(&connector);
                        return Status::Stalled;
                    }
                    self.wait_for_room(&connector, poll_inline, wait);
                }
                s if s.is_error() => {
                    tracing::error!(slot = %self.id(), status = ?s, "Element failed to drain");
                    self.core.set_failed();
                    connector.on_slot_failed(self.id(), s);
                    return s;
                }
                _ => break,
            }
        }

        connector.poll_all();
        if connector.inputs_draining() {
            while connector.awaits_inline_poll() {
                if self.core.stop_requested() || self.core.is_rewinding() {
                    return Status::Stopped;
                }
                if connector.poll_all() != Status::Ok {
                    self.core.back_off();
                }
            }
        }

        tracing::debug!(slot = %self.id(), "Input reached EOF");
        self.core.set_eof();
        connector.on_slot_eof();
        Status::Eof
    }

    fn wait_for_room(&self, connector: &Connector, poll_inline: bool, wait: Duration) {
        if poll_inline && connector.poll_all() == Status::Ok {
            return;
        }
        std::thread::sleep(wait);
    }

    fn stall_exceeded(&self, since: Instant) -> bool {
        self.core
            .timing()
            .max_stall
            .is_some_and(|budget| since.elapsed() >= budget)
    }

    fn stall(&self, connector: &Connector) {
        tracing::warn!(slot = %self.id(), "Element stayed full past the stall budget");
        self.core.set_failed();
        connector.on_slot_stalled(self.id());
    }

    pub(crate) fn freeze(&self) {
        self.core.set_frozen(true);
    }

    pub(crate) fn unfreeze(&self) {
        self.core.set_frozen(false);
    }

    /// Make any unit in flight on this slot give up. Unconnected inputs
    /// never carry one.
    pub(crate) fn begin_rewind(&self) {
        if self.is_wired() {
            self.core.begin_rewind();
        }
    }

    pub(crate) fn quiesce(&self) {
        self.core.quiesce();
    }

    pub(crate) fn restart(&self) {
        if !self.is_wired() {
            return;
        }
        self.draining.store(false, Ordering::Release);
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

impl std::fmt::Debug for InputSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputSlot")
            .field("id", &self.id())
            .field("mode", &self.mode())
            .field("state", &self.state())
            .finish()
    }
}
