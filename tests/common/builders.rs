//! Builders for the topologies the integration tests share

use framepipe::pipeline::nodes::{CollectingSink, CountingSource, Passthrough};
use framepipe::pipeline::{Element, Pipeline, ThreadingMode};
use framepipe::PipelineConfig;
use std::sync::Arc;
use std::time::Duration;

/// A source -> [passthrough] -> sink chain under construction
pub struct ChainBuilder {
    frames: u64,
    interval: Duration,
    config: PipelineConfig,
    passthrough: Option<(usize, usize, ThreadingMode)>,
    sink_delay: Duration,
    sink_depth: usize,
    sink_mode: ThreadingMode,
}

/// The pieces of a built chain
pub struct Chain {
    pub pipeline: Pipeline,
    pub source: Arc<CountingSource>,
    pub sink: Arc<CollectingSink>,
}

impl ChainBuilder {
    pub fn new(frames: u64) -> Self {
        Self {
            frames,
            interval: Duration::ZERO,
            config: PipelineConfig::default(),
            passthrough: None,
            sink_delay: Duration::ZERO,
            sink_depth: 0,
            sink_mode: ThreadingMode::Direct,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Insert a passthrough with `capacity`, fed through `mode`/`depth`
    pub fn passthrough(mut self, capacity: usize, depth: usize, mode: ThreadingMode) -> Self {
        self.passthrough = Some((capacity, depth, mode));
        self
    }

    pub fn sink(mut self, depth: usize, mode: ThreadingMode) -> Self {
        self.sink_depth = depth;
        self.sink_mode = mode;
        self
    }

    pub fn sink_delay(mut self, delay: Duration) -> Self {
        self.sink_delay = delay;
        self
    }

    pub fn build(self) -> Chain {
        let pipeline = Pipeline::new(self.config);
        let source = Arc::new(CountingSource::new(self.frames).with_interval(self.interval));
        let sink = Arc::new(CollectingSink::new().with_delay(self.sink_delay));

        pipeline
            .connect(source.clone(), 0, ThreadingMode::Direct)
            .expect("connect source");
        if let Some((capacity, depth, mode)) = self.passthrough {
            let stage: Arc<dyn Element> = Arc::new(Passthrough::new(capacity));
            pipeline.connect(stage, depth, mode).expect("connect passthrough");
        }
        pipeline
            .connect(sink.clone(), self.sink_depth, self.sink_mode)
            .expect("connect sink");

        Chain {
            pipeline,
            source,
            sink,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_builder() {
        let chain = ChainBuilder::new(5)
            .passthrough(2, 0, ThreadingMode::Direct)
            .sink(3, ThreadingMode::ThreadQueue)
            .build();

        assert_eq!(chain.pipeline.connectors().len(), 3);
        assert_eq!(chain.source.frames(), 5);
    }
}
