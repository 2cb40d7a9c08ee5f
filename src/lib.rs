//! # framepipe: threaded pipeline execution engine
//!
//! Moves opaque, reference-counted data units between pluggable processing
//! stages with per-connection threading, bounded buffering, backpressure
//! and coordinated shutdown.
//!
//! ## Architecture
//!
//! - **Elements**: processing stages behind the [`pipeline::Element`] trait
//! - **Slots**: numbered input/output ports that retry on backpressure and
//!   carry end of stream
//! - **Connectors**: bind one element to its slots and aggregate EOF
//! - **Pipeline**: owns the topology and the global state machine
//!
//! ## Example
//!
//! ```ignore
//! use framepipe::pipeline::nodes::{CollectingSink, CountingSource};
//! use framepipe::pipeline::{Pipeline, PipelineState, ThreadingMode};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let pipeline = Pipeline::default();
//! let sink = Arc::new(CollectingSink::new());
//! pipeline.connect(Arc::new(CountingSource::new(10)), 0, ThreadingMode::Direct)?;
//! pipeline.connect(sink.clone(), 3, ThreadingMode::ThreadQueue)?;
//!
//! pipeline.start()?;
//! pipeline.wait_for_state(PipelineState::Eof, Duration::from_secs(5));
//! assert_eq!(sink.received(), (0..10).collect::<Vec<u64>>());
//! pipeline.stop();
//! ```

pub mod config;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use config::{DemoConfig, PipelineConfig, TopologyConfig};
pub use error::{FramePipeError, Result, ResultExt};
pub use pipeline::{
    DataUnit, Element, Pipeline, PipelineBuilder, PipelineError, PipelineEvent, PipelineState,
    Status, ThreadingMode,
};
