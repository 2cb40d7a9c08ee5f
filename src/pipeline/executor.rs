//! Pipeline executor: topology, global state machine and statistics.
//!
//! `Pipeline` owns the ordered connector list and drives its lifecycle:
//!
//! ```text
//!   NotReady --connect--> Ready --start--> Running --(all EOF)--> Eof
//!                                            |  ^                  |
//!                                     freeze |  | unfreeze         |
//!                                            v  |                  |
//!                                           Frozen                 |
//!   Running / Frozen / Eof --restart--> Running                    |
//!   any --stop--> NotReady  <--------------------------------------+
//! ```
//!
//! The state is a single atomic, read without locking. Lifecycle calls are
//! serialised by one mutex; the connector list sits behind a read-write lock
//! so slot threads can re-check EOF while a lifecycle call is in progress.

use crate::config::{PipelineConfig, StageKind, TopologyConfig};
use crate::pipeline::bridge::{EventBus, PipelineEvent};
use crate::pipeline::connector::Connector;
use crate::pipeline::element::{element_addr, Element};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::ConnectorId;
use crate::pipeline::mode::ThreadingMode;
use crate::pipeline::nodes::{CollectingSink, CountingSource, Passthrough, Splitter};
use crate::pipeline::slot::SlotTiming;
use crate::pipeline::stats::{ConnectorStats, PipelineStats};
use crossbeam_channel::Receiver;
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PipelineState {
    NotReady = 0,
    Ready = 1,
    Running = 2,
    Frozen = 3,
    Eof = 4,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineState::Ready,
            2 => PipelineState::Running,
            3 => PipelineState::Frozen,
            4 => PipelineState::Eof,
            _ => PipelineState::NotReady,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Clock {
    started: Option<Instant>,
    stopped: Option<Instant>,
}

/// State shared between the pipeline handle and its connectors.
pub(crate) struct PipelineCore {
    state: AtomicU8,
    topology: RwLock<Vec<Arc<Connector>>>,
    events: EventBus,
    clock: Mutex<Clock>,
    /// Processed frame count captured when the topology was torn down.
    frames_at_stop: AtomicU64,
    signal_lock: Mutex<()>,
    signal: Condvar,
}

impl PipelineCore {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(PipelineState::NotReady as u8),
            topology: RwLock::new(Vec::new()),
            events: EventBus::new(),
            clock: Mutex::new(Clock::default()),
            frames_at_stop: AtomicU64::new(0),
            signal_lock: Mutex::new(()),
            signal: Condvar::new(),
        }
    }

    fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from `from` to `to` if the state is still `from`.
    fn transition(&self, from: PipelineState, to: PipelineState) -> bool {
        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            self.announce(from, to);
        }
        moved
    }

    fn set_state(&self, to: PipelineState) {
        let from = PipelineState::from_u8(self.state.swap(to as u8, Ordering::AcqRel));
        if from != to {
            self.announce(from, to);
        }
    }

    fn announce(&self, from: PipelineState, to: PipelineState) {
        tracing::debug!(?from, ?to, "Pipeline state changed");
        self.events.emit(PipelineEvent::StateChanged { from, to });
        // Taking the lock orders this notify after any waiter's state check.
        drop(self.signal_lock.lock());
        self.signal.notify_all();
    }

    pub(crate) fn emit(&self, event: PipelineEvent) {
        self.events.emit(event);
    }

    fn snapshot(&self) -> Vec<Arc<Connector>> {
        self.topology.read().clone()
    }

    /// Re-check every connector; the last one to end moves Running -> Eof.
    pub(crate) fn on_eof(&self) {
        let all_eof = {
            let topology = self.topology.read();
            !topology.is_empty() && topology.iter().all(|c| c.is_eof())
        };
        if !all_eof {
            return;
        }
        if self.transition(PipelineState::Running, PipelineState::Eof) {
            let mut clock = self.clock.lock();
            clock.stopped = Some(Instant::now());
            let elapsed = clock
                .started
                .map(|s| s.elapsed())
                .unwrap_or_default();
            tracing::info!(?elapsed, "Pipeline reached EOF");
        }
    }

    fn processing_time(&self) -> Duration {
        let clock = *self.clock.lock();
        match clock.started {
            Some(started) => clock
                .stopped
                .unwrap_or_else(Instant::now)
                .saturating_duration_since(started),
            None => Duration::ZERO,
        }
    }
}

/// A topology of connected elements and its lifecycle.
pub struct Pipeline {
    core: Arc<PipelineCore>,
    config: PipelineConfig,
    timing: SlotTiming,
    lifecycle: Mutex<()>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            core: Arc::new(PipelineCore::new()),
            timing: SlotTiming::from_config(&config),
            config,
            lifecycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current state, as a plain atomic load.
    pub fn state(&self) -> PipelineState {
        self.core.state()
    }

    /// Subscribe to pipeline events.
    pub fn events(&self) -> Receiver<PipelineEvent> {
        self.core.events.receiver()
    }

    /// Connectors in insertion order.
    pub fn connectors(&self) -> Vec<Arc<Connector>> {
        self.core.snapshot()
    }

    /// The connector wrapping `element`, if it is part of the topology.
    pub fn connector_of(&self, element: &Arc<dyn Element>) -> Option<Arc<Connector>> {
        let addr = element_addr(element);
        self.core
            .topology
            .read()
            .iter()
            .find(|c| element_addr(c.element()) == addr)
            .cloned()
    }

    // ── Graph building ──

    /// Append `element` behind the current tail.
    ///
    /// The first free output of the previous tail is wired to input 0 of
    /// `element`. A source (no inputs) is added without wiring. Use
    /// [`Pipeline::connect_with`] for branching topologies.
    pub fn connect(
        &self,
        element: Arc<dyn Element>,
        queue_depth: usize,
        mode: ThreadingMode,
    ) -> PipelineResult<ConnectorId> {
        let _guard = self.lifecycle.lock();
        self.ensure_buildable("connect")?;

        let tail = self.core.topology.read().last().cloned();
        let (downstream, appended) = self.find_or_append(element);

        if !downstream.is_source() {
            match tail {
                Some(tail) if !Arc::ptr_eq(&tail, &downstream) => {
                    let wired = tail
                        .first_free_output()
                        .ok_or(PipelineError::NoFreeOutput(tail.id()))
                        .and_then(|output| {
                            self.wire(&tail, output, &downstream, 0, queue_depth, mode)
                        });
                    if let Err(e) = wired {
                        self.discard(appended);
                        return Err(e);
                    }
                }
                _ => {
                    tracing::warn!(
                        connector = %downstream.id(),
                        "No upstream stage to wire, input stays unconnected"
                    );
                }
            }
        }

        self.core.set_state(PipelineState::Ready);
        Ok(downstream.id())
    }

    /// Wire output `upstream_slot` of `upstream` to input `downstream_slot`
    /// of `downstream`.
    ///
    /// `upstream` must already be part of the pipeline. `downstream` gets a
    /// new connector unless it already has one, which lets stages with
    /// several inputs be fed from several branches.
    pub fn connect_with(
        &self,
        downstream: Arc<dyn Element>,
        downstream_slot: usize,
        upstream: &Arc<dyn Element>,
        upstream_slot: usize,
        queue_depth: usize,
        mode: ThreadingMode,
    ) -> PipelineResult<ConnectorId> {
        let _guard = self.lifecycle.lock();
        self.ensure_buildable("connect")?;

        let up = self
            .connector_of(upstream)
            .ok_or(PipelineError::UnknownElement)?;
        if let Some(existing) = self.connector_of(&downstream) {
            if Arc::ptr_eq(&existing, &up) || Self::reaches(&existing, &up) {
                return Err(PipelineError::CycleDetected {
                    upstream: up.id(),
                    downstream: existing.id(),
                });
            }
        }

        let (down, appended) = self.find_or_append(downstream);
        if let Err(e) = self.wire(&up, upstream_slot, &down, downstream_slot, queue_depth, mode) {
            self.discard(appended);
            return Err(e);
        }
        self.core.set_state(PipelineState::Ready);
        Ok(down.id())
    }

    fn ensure_buildable(&self, operation: &'static str) -> PipelineResult<()> {
        match self.state() {
            PipelineState::NotReady | PipelineState::Ready => Ok(()),
            state => Err(PipelineError::WrongState { operation, state }),
        }
    }

    /// The connector for `element`, and whether it was just created.
    fn find_or_append(&self, element: Arc<dyn Element>) -> (Arc<Connector>, bool) {
        if let Some(existing) = self.connector_of(&element) {
            return (existing, false);
        }
        let mut topology = self.core.topology.write();
        let id = ConnectorId(topology.len() as u32);
        let connector = Connector::new(id, element, Arc::downgrade(&self.core), self.timing);
        tracing::debug!(
            connector = %id,
            inputs = connector.inputs().len(),
            outputs = connector.outputs().len(),
            "Added connector"
        );
        topology.push(Arc::clone(&connector));
        (connector, true)
    }

    /// Roll back a connector appended by a connect call that then failed.
    fn discard(&self, appended: bool) {
        if appended {
            self.core.topology.write().pop();
        }
    }

    /// Whether `to` can be reached from `from` along existing connections.
    fn reaches(from: &Arc<Connector>, to: &Arc<Connector>) -> bool {
        let mut visited = Vec::new();
        let mut stack = vec![Arc::clone(from)];

        while let Some(current) = stack.pop() {
            if Arc::ptr_eq(&current, to) {
                return true;
            }
            if visited.contains(&current.id()) {
                continue;
            }
            visited.push(current.id());
            stack.extend(current.downstream());
        }
        false
    }

    fn wire(
        &self,
        up: &Arc<Connector>,
        output_index: usize,
        down: &Arc<Connector>,
        input_index: usize,
        queue_depth: usize,
        mode: ThreadingMode,
    ) -> PipelineResult<()> {
        let output = up.output(output_index).ok_or(PipelineError::SlotOutOfRange {
            connector: up.id(),
            index: output_index,
            count: up.outputs().len(),
        })?;
        let input = down.input(input_index).ok_or(PipelineError::SlotOutOfRange {
            connector: down.id(),
            index: input_index,
            count: down.inputs().len(),
        })?;
        if output.is_wired() {
            return Err(PipelineError::SlotAlreadyConnected(output.id()));
        }
        if input.is_wired() {
            return Err(PipelineError::SlotAlreadyConnected(input.id()));
        }

        let depth = if queue_depth == 0 {
            self.config.queue.default_depth
        } else {
            queue_depth
        };
        output.wire(Arc::clone(input), mode, depth);
        input.wire(output, mode);
        tracing::info!(
            "Connected {} -> {} ({:?}, depth {})",
            output.id(),
            input.id(),
            mode,
            depth
        );
        Ok(())
    }

    // ── Lifecycle ──

    /// Start every connector in insertion order.
    pub fn start(&self) -> PipelineResult<()> {
        let _guard = self.lifecycle.lock();
        let state = self.state();
        if state != PipelineState::Ready {
            return Err(PipelineError::WrongState {
                operation: "start",
                state,
            });
        }

        let connectors = self.core.snapshot();
        *self.core.clock.lock() = Clock {
            started: Some(Instant::now()),
            stopped: None,
        };
        self.core.frames_at_stop.store(0, Ordering::Relaxed);
        self.core.set_state(PipelineState::Running);

        for connector in &connectors {
            connector.prepare();
        }
        for connector in &connectors {
            if let Err(e) = connector.start() {
                tracing::error!("Failed to start {}: {}", connector.id(), e);
                self.teardown(&connectors);
                return Err(e);
            }
        }
        tracing::info!(connectors = connectors.len(), "Pipeline started");

        // A topology with nothing left to run ends immediately.
        self.core.on_eof();
        Ok(())
    }

    /// Stop every thread, drain pending inputs and clear the topology.
    /// Safe to call in any state, any number of times.
    pub fn stop(&self) {
        let _guard = self.lifecycle.lock();
        let connectors = self.core.snapshot();
        if connectors.is_empty() && self.state() == PipelineState::NotReady {
            return;
        }
        self.teardown(&connectors);
        tracing::info!(
            frames = self.core.frames_at_stop.load(Ordering::Relaxed),
            "Pipeline stopped"
        );
    }

    fn teardown(&self, connectors: &[Arc<Connector>]) {
        for connector in connectors {
            connector.request_stop();
        }
        for connector in connectors {
            connector.join();
        }
        for connector in connectors {
            connector.drain_pending_inputs();
        }

        let frames = connectors.last().map(|c| c.frames()).unwrap_or(0);
        self.core.frames_at_stop.store(frames, Ordering::Relaxed);
        {
            let mut clock = self.core.clock.lock();
            if clock.started.is_some() && clock.stopped.is_none() {
                clock.stopped = Some(Instant::now());
            }
        }
        self.core.topology.write().clear();
        self.core.set_state(PipelineState::NotReady);
    }

    /// Rewind a started pipeline to the top of its streams, keeping threads
    /// and queues. Counters and the start instant are reset.
    pub fn restart(&self) -> PipelineResult<()> {
        let _guard = self.lifecycle.lock();
        let state = self.state();
        if !matches!(
            state,
            PipelineState::Running | PipelineState::Frozen | PipelineState::Eof
        ) {
            return Err(PipelineError::WrongState {
                operation: "restart",
                state,
            });
        }

        let connectors = self.core.snapshot();
        for connector in &connectors {
            connector.freeze();
        }
        // Every slot gives up its in-flight unit before any of them is
        // waited on, since one step may reach several connectors.
        for connector in &connectors {
            connector.begin_rewind();
        }
        for connector in &connectors {
            connector.quiesce();
        }
        for connector in &connectors {
            connector.restart();
        }
        *self.core.clock.lock() = Clock {
            started: Some(Instant::now()),
            stopped: None,
        };
        self.core.set_state(PipelineState::Running);
        for connector in &connectors {
            connector.unfreeze();
        }
        // Stages with nothing connected end again straight away.
        for connector in &connectors {
            connector.on_slot_eof();
        }
        tracing::info!("Pipeline restarted");
        Ok(())
    }

    /// Park every slot without ending any stream.
    pub fn freeze(&self) -> PipelineResult<()> {
        let _guard = self.lifecycle.lock();
        if !self
            .core
            .transition(PipelineState::Running, PipelineState::Frozen)
        {
            return Err(PipelineError::WrongState {
                operation: "freeze",
                state: self.state(),
            });
        }
        for connector in self.core.snapshot() {
            connector.freeze();
        }
        tracing::info!("Pipeline frozen");
        Ok(())
    }

    pub fn unfreeze(&self) -> PipelineResult<()> {
        let _guard = self.lifecycle.lock();
        if !self
            .core
            .transition(PipelineState::Frozen, PipelineState::Running)
        {
            return Err(PipelineError::WrongState {
                operation: "unfreeze",
                state: self.state(),
            });
        }
        for connector in self.core.snapshot() {
            connector.unfreeze();
        }
        tracing::info!("Pipeline unfrozen");
        // Streams may have ended while frozen.
        self.core.on_eof();
        Ok(())
    }

    /// Drop buffered, undelivered units everywhere. Returns how many queued
    /// units were discarded. EOF markers are kept.
    pub fn flush(&self) -> usize {
        let _guard = self.lifecycle.lock();
        let dropped: usize = self
            .core
            .snapshot()
            .iter()
            .map(|c| c.flush())
            .sum();
        tracing::info!(dropped, "Pipeline flushed");
        dropped
    }

    /// Block until the pipeline is in `target` or `timeout` expires.
    pub fn wait_for_state(&self, target: PipelineState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.core.signal_lock.lock();
        while self.state() != target {
            if self
                .core
                .signal
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                return self.state() == target;
            }
        }
        true
    }

    // ── Statistics ──

    /// Units that reached the last connector; the value captured at stop
    /// once the topology is gone.
    pub fn processed_frames(&self) -> u64 {
        match self.core.topology.read().last() {
            Some(last) => last.frames(),
            None => self.core.frames_at_stop.load(Ordering::Relaxed),
        }
    }

    /// Wall-clock time from start (or restart) to EOF, stop, or now.
    pub fn processing_time(&self) -> Duration {
        self.core.processing_time()
    }

    pub fn fps(&self) -> f64 {
        let secs = self.processing_time().as_secs_f64();
        if secs > 0.0 {
            self.processed_frames() as f64 / secs
        } else {
            0.0
        }
    }

    pub fn connector_stats(&self) -> Vec<ConnectorStats> {
        self.core.snapshot().iter().map(|c| c.stats()).collect()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            state: self.state(),
            processed_frames: self.processed_frames(),
            fps: self.fps(),
            processing_time: self.processing_time(),
            connectors: self.connector_stats(),
        }
    }

    /// Per-element summaries, in connector order.
    pub fn display_results(&self) -> Vec<String> {
        self.core
            .snapshot()
            .iter()
            .filter_map(|c| c.display_result())
            .collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handles on the built-in elements of a pipeline built from a topology.
pub struct PipelineHandles {
    pub source: Arc<CountingSource>,
    /// Sinks in branch order.
    pub sinks: Vec<Arc<CollectingSink>>,
}

/// Builds pipelines out of the built-in elements.
pub struct PipelineBuilder {
    config: PipelineConfig,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Build the topology described by `topology`:
    /// ```text
    /// CountingSource -> [Splitter] -> branch stages ... -> CollectingSink
    /// ```
    /// The splitter is only inserted for more than one branch.
    pub fn build_from(self, topology: &TopologyConfig) -> PipelineResult<(Pipeline, PipelineHandles)> {
        let pipeline = Pipeline::new(self.config);

        let source = Arc::new(
            CountingSource::new(topology.frames)
                .with_interval(Duration::from_millis(topology.frame_interval_ms)),
        );
        let source_element: Arc<dyn Element> = source.clone();
        pipeline.connect(Arc::clone(&source_element), 0, ThreadingMode::Direct)?;

        let branch_count = topology.branches.len();
        let root = if branch_count > 1 {
            let splitter: Arc<dyn Element> = Arc::new(Splitter::new(branch_count, 2));
            pipeline.connect_with(
                Arc::clone(&splitter),
                0,
                &source_element,
                0,
                0,
                topology.splitter_mode,
            )?;
            splitter
        } else {
            source_element
        };

        let mut sinks = Vec::new();
        for (root_slot, branch) in topology.branches.iter().enumerate() {
            let mut upstream = Arc::clone(&root);
            let mut upstream_slot = root_slot;
            for stage in &branch.stages {
                let delay = Duration::from_millis(stage.delay_ms);
                let element: Arc<dyn Element> = match stage.kind {
                    StageKind::Passthrough => {
                        Arc::new(Passthrough::new(stage.capacity).with_delay(delay))
                    }
                    StageKind::Sink => {
                        let sink = Arc::new(CollectingSink::new().with_delay(delay));
                        sinks.push(Arc::clone(&sink));
                        sink
                    }
                };
                pipeline.connect_with(
                    Arc::clone(&element),
                    0,
                    &upstream,
                    upstream_slot,
                    stage.queue_depth.unwrap_or(0),
                    stage.mode,
                )?;
                upstream = element;
                upstream_slot = 0;
            }
        }

        tracing::info!(
            connectors = pipeline.connectors().len(),
            branches = branch_count,
            "Built pipeline from topology"
        );
        Ok((pipeline, PipelineHandles { source, sinks }))
    }
}
