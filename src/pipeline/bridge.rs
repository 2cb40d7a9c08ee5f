//! Event channel between the pipeline threads and whoever drives it.
//!
//! Slot threads never block on the observer: events go through a bounded
//! crossbeam channel and are read with [`EventBus::drain`] or by cloning the
//! receiver from [`crate::pipeline::Pipeline::events`]. When nobody reads,
//! the oldest events are dropped to make room, so a pipeline restarted in a
//! loop keeps a fixed backlog.

use crate::pipeline::executor::PipelineState;
use crate::pipeline::id::{ConnectorId, SlotId};
use crate::pipeline::status::Status;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Events kept for a reader that has not caught up yet
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications emitted while the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The global state machine moved.
    StateChanged {
        from: PipelineState,
        to: PipelineState,
    },

    /// Every slot of a connector reached end of stream.
    ConnectorEof(ConnectorId),

    /// An element returned an unexpected status; the slot stopped.
    SlotFailed { slot: SlotId, status: Status },

    /// An element stayed full for longer than the stall budget.
    SlotStalled { slot: SlotId },
}

pub struct EventBus {
    tx: Sender<PipelineEvent>,
    rx: Receiver<PipelineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    pub fn emit(&self, mut event: PipelineEvent) {
        tracing::trace!(?event, "Pipeline event");
        // The bus owns a receiver, so the channel is never disconnected and
        // a full channel is emptied from the old end.
        while let Err(TrySendError::Full(rejected)) = self.tx.try_send(event) {
            if self.rx.try_recv().is_ok() {
                tracing::trace!("Event backlog full, dropped oldest event");
            }
            event = rejected;
        }
    }

    /// Events waiting to be read.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn receiver(&self) -> Receiver<PipelineEvent> {
        self.rx.clone()
    }

    /// Drain all pending events.
    pub fn drain(&self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
