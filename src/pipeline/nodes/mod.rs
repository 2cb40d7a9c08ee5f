//! Built-in elements.
//!
//! Small, self-contained stages used by the demo binary, the topology
//! builder and the tests. Real deployments plug in their own [`Element`]
//! implementations.
//!
//! [`Element`]: crate::pipeline::Element

pub mod collecting_sink;
pub mod counting_source;
pub mod passthrough;
pub mod splitter;

pub use collecting_sink::CollectingSink;
pub use counting_source::{CountingSource, LAST_UNIT_PROPERTY};
pub use passthrough::Passthrough;
pub use splitter::Splitter;
