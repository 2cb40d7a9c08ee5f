//! Threaded pipeline engine.
//!
//! Data units flow between pluggable elements through numbered slots. Each
//! connection picks its own threading mode; a global state machine governs
//! the whole topology.
//!
//! # Architecture
//!
//! ```text
//! [Source] ──out0──► in0 [Filter] ──out0──► in0 [Sink]
//!             │                        │
//!          ThreadQueue              Direct
//!      (FIFO, 2 threads)     (runs on the pushing thread)
//! ```
//!
//! # Design
//!
//! - **Element trait**: every stage is an `Arc<dyn Element>`; the engine
//!   never enumerates concrete stages.
//! - **EOF is a value**: `Option::<DataUnit>::None` travels the same path
//!   as data and is never dropped by a full queue.
//! - **Per-connection threading**: `Direct`, `ThreadPoll` or `ThreadQueue`
//!   chosen at connect time.
//! - **Atomic state**: slot flags and the pipeline state are atomics; the
//!   bounded FIFO is the only structure two threads mutate.

pub mod bridge;
pub mod connector;
pub mod element;
pub mod error;
pub mod executor;
pub mod id;
pub mod mode;
pub mod nodes;
pub mod queue;
pub mod slot;
pub mod stats;
pub mod status;
pub mod unit;

pub use bridge::{EventBus, PipelineEvent, EVENT_CHANNEL_CAPACITY};
pub use connector::Connector;
pub use element::Element;
pub use error::{PipelineError, PipelineResult};
pub use executor::{Pipeline, PipelineBuilder, PipelineHandles, PipelineState};
pub use id::{ConnectorId, SlotId};
pub use mode::{SlotDirection, SlotState, ThreadingMode};
pub use queue::{FrameQueue, QueueStats};
pub use slot::{InputSlot, OutputSlot, SlotTiming};
pub use stats::{ConnectorStats, PipelineStats};
pub use status::Status;
pub use unit::{DataUnit, PropertyValue};
