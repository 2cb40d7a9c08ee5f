//! Input and output slots.
//!
//! A slot is one numbered port of an element. Both directions share the
//! bookkeeping in [`SlotCore`]: the monotonic flags (eof, frozen, failed,
//! stop) and the optional worker thread. The flags are plain atomics; the
//! only structure mutated concurrently by two threads is the FIFO of a
//! `ThreadQueue` connection.

mod input;
mod output;

pub use input::InputSlot;
pub use output::OutputSlot;

use crate::config::PipelineConfig;
use crate::pipeline::connector::Connector;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::SlotId;
use crate::pipeline::mode::SlotState;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

/// Timing knobs resolved from [`PipelineConfig`] once per connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTiming {
    pub poll_timeout: Duration,
    pub submit_timeout: Duration,
    pub backoff: Duration,
    pub max_stall: Option<Duration>,
}

impl SlotTiming {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            poll_timeout: config.timing.poll_timeout(),
            submit_timeout: config.timing.submit_timeout(),
            backoff: config.timing.backoff(),
            max_stall: config.stall.max_stall(),
        }
    }
}

impl Default for SlotTiming {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

pub(crate) struct SlotCore {
    id: SlotId,
    state: AtomicU8,
    eof: AtomicBool,
    frozen: AtomicBool,
    failed: AtomicBool,
    stop: AtomicBool,
    /// Set while a restart waits for in-flight work to be abandoned.
    rewinding: AtomicBool,
    /// Held by the slot thread for one pull-and-forward step.
    busy: Mutex<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
    connector: Weak<Connector>,
    timing: SlotTiming,
}

impl SlotCore {
    pub(crate) fn new(id: SlotId, connector: Weak<Connector>, timing: SlotTiming) -> Self {
        Self {
            id,
            state: AtomicU8::new(SlotState::Idle as u8),
            eof: AtomicBool::new(false),
            frozen: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            rewinding: AtomicBool::new(false),
            busy: Mutex::new(()),
            thread: Mutex::new(None),
            connector,
            timing,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> SlotId {
        self.id
    }

    #[inline]
    pub(crate) fn timing(&self) -> &SlotTiming {
        &self.timing
    }

    pub(crate) fn connector(&self) -> Option<Arc<Connector>> {
        self.connector.upgrade()
    }

    pub(crate) fn state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SlotState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_eof(&self) -> bool {
        self.eof.load(Ordering::Acquire)
    }

    pub(crate) fn set_eof(&self) {
        self.eof.store(true, Ordering::Release);
        if self.state() == SlotState::Running {
            self.set_state(SlotState::Eof);
        }
    }

    #[inline]
    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub(crate) fn set_frozen(&self, frozen: bool) {
        self.frozen.store(frozen, Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub(crate) fn set_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Whether a unit in flight must be dropped instead of forwarded.
    #[inline]
    pub(crate) fn is_rewinding(&self) -> bool {
        self.rewinding.load(Ordering::Acquire)
    }

    pub(crate) fn begin_rewind(&self) {
        self.rewinding.store(true, Ordering::Release);
    }

    /// Enter one step of the slot loop. Flags must be checked after taking
    /// the guard.
    pub(crate) fn busy(&self) -> MutexGuard<'_, ()> {
        self.busy.lock()
    }

    /// Block until the step in progress, if any, has finished.
    pub(crate) fn quiesce(&self) {
        drop(self.busy.lock());
    }

    /// Whether a loop iteration should idle instead of moving data.
    #[inline]
    pub(crate) fn is_parked(&self) -> bool {
        self.is_frozen() || self.is_eof() || self.is_failed()
    }

    /// Clear end-of-stream, failure and rewinding so the slot can carry a
    /// new stream.
    /// The frozen flag is left alone; restart runs with every slot frozen.
    pub(crate) fn rewind(&self) {
        self.eof.store(false, Ordering::Release);
        self.failed.store(false, Ordering::Release);
        self.rewinding.store(false, Ordering::Release);
        if self.state() == SlotState::Eof {
            self.set_state(SlotState::Running);
        }
    }

    pub(crate) fn back_off(&self) {
        std::thread::sleep(self.timing.backoff);
    }

    pub(crate) fn spawn<F>(&self, body: F) -> PipelineResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name(format!("framepipe-{}", self.id))
            .spawn(body)
            .map_err(|e| PipelineError::ThreadSpawn {
                slot: self.id,
                message: e.to_string(),
            })?;
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// Join the worker thread, if any. No-op when called from that thread.
    pub(crate) fn join(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!(slot = %self.id, "Slot thread panicked");
            }
        }
        self.set_state(SlotState::Stopped);
    }

    pub(crate) fn has_thread(&self) -> bool {
        self.thread.lock().is_some()
    }
}
