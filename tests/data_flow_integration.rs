//! Integration tests for data flow through running pipelines
//!
//! These tests validate delivery guarantees across threading modes:
//! - EOF propagation and frame counting
//! - Ordering and no loss under backpressure
//! - Bounded queues never dropping EOF
//! - Branching and merging topologies
//! - Failure and stall isolation

mod common;

use common::builders::ChainBuilder;
use common::mock_helpers::{AlwaysFull, EofGatedSink, FailingSink, Merger};
use common::{assert_sequence, test_timeout, wait_until};
use framepipe::config::{BranchConfig, StageConfig, TopologyConfig};
use framepipe::pipeline::nodes::{CollectingSink, CountingSource, Passthrough, Splitter};
use framepipe::pipeline::{
    Element, Pipeline, PipelineBuilder, PipelineEvent, PipelineState, ThreadingMode,
};
use framepipe::PipelineConfig;
use serial_test::serial;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[test]
#[serial]
fn test_thread_queue_scenario_zero_to_nine() {
    let chain = ChainBuilder::new(10)
        .sink(3, ThreadingMode::ThreadQueue)
        .build();

    chain.pipeline.start().unwrap();
    assert!(chain.pipeline.wait_for_state(PipelineState::Eof, test_timeout()));

    assert_sequence(&chain.sink.received(), 10);
    assert_eq!(chain.sink.eof_count(), 1);
    assert_eq!(chain.pipeline.processed_frames(), 10);

    // The count is stable once EOF was reached.
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(chain.pipeline.processed_frames(), 10);
    assert_eq!(chain.sink.eof_count(), 1);

    chain.pipeline.stop();
    assert_eq!(chain.pipeline.processed_frames(), 10);
    assert_eq!(chain.sink.eof_count(), 1, "Stop must not drain a finished input again");
}

#[test]
#[serial]
fn test_direct_chain_loses_nothing_under_backpressure() {
    for frames in [0u64, 1, 2, 7, 64] {
        let chain = ChainBuilder::new(frames)
            .passthrough(1, 0, ThreadingMode::Direct)
            .sink(0, ThreadingMode::Direct)
            .sink_delay(Duration::from_micros(200))
            .build();

        chain.pipeline.start().unwrap();
        assert!(
            chain.pipeline.wait_for_state(PipelineState::Eof, test_timeout()),
            "No EOF for {} frames",
            frames
        );
        assert_sequence(&chain.sink.received(), frames);
        assert_eq!(chain.sink.eof_count(), 1);
        assert_eq!(chain.pipeline.processed_frames(), frames);
        chain.pipeline.stop();
    }
}

#[test]
#[serial]
fn test_depth_one_queue_delivers_eof() {
    let chain = ChainBuilder::new(5)
        .sink(1, ThreadingMode::ThreadQueue)
        .sink_delay(Duration::from_millis(5))
        .build();

    chain.pipeline.start().unwrap();
    assert!(chain.pipeline.wait_for_state(PipelineState::Eof, test_timeout()));
    assert_sequence(&chain.sink.received(), 5);
    assert_eq!(chain.sink.eof_count(), 1);

    let stats = chain.pipeline.connector_stats();
    let (_, queue) = stats[0].queues[0];
    assert_eq!(queue.capacity, 1);
    assert_eq!(queue.total_pushed, 6, "Five units plus the EOF marker");
}

#[test]
#[serial]
fn test_thread_poll_chain() {
    let chain = ChainBuilder::new(50)
        .passthrough(2, 0, ThreadingMode::ThreadPoll)
        .sink(0, ThreadingMode::ThreadPoll)
        .build();

    chain.pipeline.start().unwrap();
    assert!(chain.pipeline.wait_for_state(PipelineState::Eof, test_timeout()));
    assert_sequence(&chain.sink.received(), 50);
    assert_eq!(chain.sink.eof_count(), 1);
}

#[test]
#[serial]
fn test_mixed_modes_chain() {
    let chain = ChainBuilder::new(100)
        .passthrough(3, 4, ThreadingMode::ThreadQueue)
        .sink(0, ThreadingMode::Direct)
        .build();

    chain.pipeline.start().unwrap();
    assert!(chain.pipeline.wait_for_state(PipelineState::Eof, test_timeout()));
    assert_sequence(&chain.sink.received(), 100);
    assert_eq!(chain.pipeline.processed_frames(), 100);
    assert!(chain.pipeline.fps() > 0.0);
}

#[test]
#[serial]
fn test_splitter_waits_for_slowest_branch() {
    let topology = TopologyConfig {
        frames: 20,
        frame_interval_ms: 0,
        splitter_mode: ThreadingMode::Direct,
        branches: vec![
            BranchConfig {
                stages: vec![StageConfig::sink(ThreadingMode::ThreadQueue)
                    .with_queue_depth(4)
                    .with_delay_ms(10)],
            },
            BranchConfig {
                stages: vec![StageConfig::sink(ThreadingMode::ThreadQueue)
                    .with_queue_depth(4)
                    .with_delay_ms(1)],
            },
        ],
    };
    let (pipeline, handles) = PipelineBuilder::new(PipelineConfig::default())
        .build_from(&topology)
        .unwrap();
    let events = pipeline.events();
    let (slow, fast) = (&handles.sinks[0], &handles.sinks[1]);

    pipeline.start().unwrap();
    assert!(wait_until(test_timeout(), || fast.eof_count() == 1));

    assert!(pipeline.wait_for_state(PipelineState::Eof, test_timeout()));
    assert_sequence(&slow.received(), 20);
    assert_sequence(&fast.received(), 20);
    assert_eq!(slow.eof_count(), 1);
    assert_eq!(fast.eof_count(), 1);

    let connectors = pipeline.connectors();
    let slow_id = connectors[2].id();
    let fast_id = connectors[3].id();
    let events: Vec<_> = events.try_iter().collect();
    let position = |wanted: &PipelineEvent| events.iter().position(|e| e == wanted);
    let global = position(&PipelineEvent::StateChanged {
        from: PipelineState::Running,
        to: PipelineState::Eof,
    })
    .expect("global EOF event");
    assert!(position(&PipelineEvent::ConnectorEof(slow_id)).unwrap() < global);
    assert!(position(&PipelineEvent::ConnectorEof(fast_id)).unwrap() < global);
}

#[test]
#[serial]
fn test_finished_branch_does_not_end_pipeline() {
    let pipeline = Pipeline::default();
    let source: Arc<dyn Element> = Arc::new(CountingSource::new(20));
    let splitter: Arc<dyn Element> = Arc::new(Splitter::new(2, 2));
    let held = Arc::new(EofGatedSink::default());
    let fast = Arc::new(CollectingSink::new());

    pipeline.connect(Arc::clone(&source), 0, ThreadingMode::Direct).unwrap();
    pipeline
        .connect_with(Arc::clone(&splitter), 0, &source, 0, 0, ThreadingMode::Direct)
        .unwrap();
    let held_id = pipeline
        .connect_with(held.clone(), 0, &splitter, 0, 4, ThreadingMode::ThreadQueue)
        .unwrap();
    let fast_id = pipeline
        .connect_with(fast.clone(), 0, &splitter, 1, 4, ThreadingMode::ThreadQueue)
        .unwrap();
    let events = pipeline.events();

    pipeline.start().unwrap();
    assert!(wait_until(test_timeout(), || fast.eof_count() == 1));
    assert!(wait_until(test_timeout(), || {
        held.drain_attempts.load(Ordering::Relaxed) > 0
    }));

    // One branch is done, the other holds its end of stream.
    assert_sequence(&fast.received(), 20);
    assert_sequence(&held.received(), 20);
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(pipeline.state(), PipelineState::Running);
    assert!(!pipeline.connectors()[held_id.0 as usize].is_eof());

    held.release();
    assert!(pipeline.wait_for_state(PipelineState::Eof, test_timeout()));
    assert_eq!(held.drains.load(Ordering::Relaxed), 1);

    let events: Vec<_> = events.try_iter().collect();
    let position = |wanted: &PipelineEvent| events.iter().position(|e| e == wanted);
    let fast_eof = position(&PipelineEvent::ConnectorEof(fast_id)).unwrap();
    let held_eof = position(&PipelineEvent::ConnectorEof(held_id)).unwrap();
    let global = position(&PipelineEvent::StateChanged {
        from: PipelineState::Running,
        to: PipelineState::Eof,
    })
    .unwrap();
    assert!(fast_eof < held_eof);
    assert!(held_eof < global);
}

#[test]
#[serial]
fn test_merge_two_sources() {
    let pipeline = Pipeline::default();
    let a: Arc<dyn Element> = Arc::new(CountingSource::new(30));
    let b: Arc<dyn Element> = Arc::new(CountingSource::new(30));
    let merger: Arc<dyn Element> = Arc::new(Merger::default());
    let sink = Arc::new(CollectingSink::new());

    pipeline.connect(Arc::clone(&a), 0, ThreadingMode::Direct).unwrap();
    pipeline.connect(Arc::clone(&b), 0, ThreadingMode::Direct).unwrap();
    let first = pipeline
        .connect_with(Arc::clone(&merger), 0, &a, 0, 0, ThreadingMode::Direct)
        .unwrap();
    let second = pipeline
        .connect_with(Arc::clone(&merger), 1, &b, 0, 0, ThreadingMode::Direct)
        .unwrap();
    assert_eq!(first, second, "Second input reuses the merger's connector");
    pipeline
        .connect_with(sink.clone(), 0, &merger, 0, 0, ThreadingMode::Direct)
        .unwrap();

    pipeline.start().unwrap();
    assert!(pipeline.wait_for_state(PipelineState::Eof, test_timeout()));

    let mut received = sink.received();
    received.sort_unstable();
    let expected: Vec<u64> = (0..30).flat_map(|n| [n, n]).collect();
    assert_eq!(received, expected);
    assert_eq!(sink.eof_count(), 1);
}

#[test]
#[serial]
fn test_failing_branch_does_not_stop_sibling() {
    let pipeline = Pipeline::default();
    let source: Arc<dyn Element> = Arc::new(CountingSource::new(25));
    let splitter: Arc<dyn Element> = Arc::new(Splitter::new(2, 2));
    let failing = Arc::new(FailingSink::new(3));
    let healthy = Arc::new(CollectingSink::new());
    let events = pipeline.events();

    pipeline.connect(Arc::clone(&source), 0, ThreadingMode::Direct).unwrap();
    pipeline
        .connect_with(Arc::clone(&splitter), 0, &source, 0, 0, ThreadingMode::Direct)
        .unwrap();
    pipeline
        .connect_with(failing.clone(), 0, &splitter, 0, 2, ThreadingMode::ThreadQueue)
        .unwrap();
    pipeline
        .connect_with(healthy.clone(), 0, &splitter, 1, 2, ThreadingMode::ThreadQueue)
        .unwrap();

    pipeline.start().unwrap();
    assert!(wait_until(test_timeout(), || healthy.eof_count() == 1));
    assert_sequence(&healthy.received(), 25);
    assert_eq!(failing.accepted.load(Ordering::Relaxed), 3);

    // The failed branch never ends, so neither does the pipeline.
    assert!(!pipeline.wait_for_state(PipelineState::Eof, Duration::from_millis(100)));
    assert!(events
        .try_iter()
        .any(|e| matches!(e, PipelineEvent::SlotFailed { .. })));

    pipeline.stop();
    assert_eq!(pipeline.state(), PipelineState::NotReady);
}

#[test]
#[serial]
fn test_stall_budget_gives_up() {
    let config = PipelineConfig::default().with_max_stall(Duration::from_millis(30));
    let pipeline = Pipeline::new(config);
    let stuck = Arc::new(AlwaysFull::default());
    let events = pipeline.events();

    pipeline
        .connect(Arc::new(CountingSource::new(10)), 0, ThreadingMode::Direct)
        .unwrap();
    let stuck_id = pipeline
        .connect(stuck.clone(), 0, ThreadingMode::Direct)
        .unwrap();
    pipeline.start().unwrap();

    let stalled = wait_until(test_timeout(), || {
        events.try_iter().any(|e| {
            matches!(e, PipelineEvent::SlotStalled { slot } if slot.connector == stuck_id)
        })
    });
    assert!(stalled);
    assert_ne!(pipeline.state(), PipelineState::Eof);

    pipeline.stop();
    // Teardown still gives the element its drain.
    assert_eq!(stuck.drains.load(Ordering::Relaxed), 1);
}

#[test]
#[serial]
fn test_unwired_input_does_not_block_eof() {
    let pipeline = Pipeline::default();
    let lonely = Arc::new(CollectingSink::new());
    let source: Arc<dyn Element> = Arc::new(CountingSource::new(5));
    let sink = Arc::new(CollectingSink::new());

    // Nothing precedes the first sink, so its input stays unconnected.
    pipeline.connect(lonely.clone(), 0, ThreadingMode::Direct).unwrap();
    pipeline.connect(Arc::clone(&source), 0, ThreadingMode::Direct).unwrap();
    pipeline
        .connect_with(sink.clone(), 0, &source, 0, 2, ThreadingMode::ThreadQueue)
        .unwrap();
    assert!(!pipeline.connectors()[0].inputs()[0].is_wired());

    pipeline.start().unwrap();
    assert!(pipeline.wait_for_state(PipelineState::Eof, test_timeout()));
    assert_sequence(&sink.received(), 5);
    assert!(lonely.received().is_empty());
    assert_eq!(lonely.eof_count(), 0, "An unconnected input is never drained");
}

#[test]
#[serial]
fn test_passthrough_in_queue_chain() {
    let pipeline = Pipeline::default();
    let stage = Arc::new(Passthrough::new(2));
    let sink = Arc::new(CollectingSink::new());

    pipeline
        .connect(Arc::new(CountingSource::new(40)), 0, ThreadingMode::Direct)
        .unwrap();
    pipeline.connect(stage.clone(), 2, ThreadingMode::ThreadQueue).unwrap();
    pipeline.connect(sink.clone(), 2, ThreadingMode::ThreadQueue).unwrap();

    pipeline.start().unwrap();
    assert!(pipeline.wait_for_state(PipelineState::Eof, test_timeout()));
    assert_sequence(&sink.received(), 40);
    assert_eq!(stage.forwarded(), 40);
    assert_eq!(stage.buffered(), 0);
}
