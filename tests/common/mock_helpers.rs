//! Hand-written elements for failure and backpressure scenarios

use framepipe::pipeline::{DataUnit, Element, Status};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Sink that answers `InputFull` forever.
#[derive(Default)]
pub struct AlwaysFull {
    pub attempts: AtomicU64,
    pub drains: AtomicU64,
}

impl Element for AlwaysFull {
    fn submit_input(&self, _data: &DataUnit, _input: usize) -> Status {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Status::InputFull
    }

    fn query_output(&self, _output: usize) -> (Option<DataUnit>, Status) {
        (None, Status::WrongState)
    }

    fn drain(&self, _input: usize) -> Status {
        self.drains.fetch_add(1, Ordering::Relaxed);
        Status::Ok
    }

    fn input_slot_count(&self) -> usize {
        1
    }

    fn output_slot_count(&self) -> usize {
        0
    }
}

/// Sink that accepts `accept` units, then fails every submission.
pub struct FailingSink {
    accept: u64,
    pub accepted: AtomicU64,
}

impl FailingSink {
    pub fn new(accept: u64) -> Self {
        Self {
            accept,
            accepted: AtomicU64::new(0),
        }
    }
}

impl Element for FailingSink {
    fn submit_input(&self, _data: &DataUnit, _input: usize) -> Status {
        if self.accepted.load(Ordering::Relaxed) >= self.accept {
            return Status::Fail;
        }
        self.accepted.fetch_add(1, Ordering::Relaxed);
        Status::Ok
    }

    fn query_output(&self, _output: usize) -> (Option<DataUnit>, Status) {
        (None, Status::WrongState)
    }

    fn drain(&self, _input: usize) -> Status {
        Status::Ok
    }

    fn input_slot_count(&self) -> usize {
        1
    }

    fn output_slot_count(&self) -> usize {
        0
    }
}

/// Sink that refuses input while its gate is closed and records the rest.
#[derive(Default)]
pub struct GatedSink {
    open: AtomicBool,
    received: Mutex<Vec<u64>>,
    pub drains: AtomicU64,
}

impl GatedSink {
    pub fn open(&self) {
        self.open.store(true, Ordering::Release);
    }

    pub fn received(&self) -> Vec<u64> {
        self.received.lock().clone()
    }
}

impl Element for GatedSink {
    fn submit_input(&self, data: &DataUnit, _input: usize) -> Status {
        if !self.open.load(Ordering::Acquire) {
            return Status::InputFull;
        }
        if let Some(seq) = data.payload::<u64>() {
            self.received.lock().push(*seq);
        }
        Status::Ok
    }

    fn query_output(&self, _output: usize) -> (Option<DataUnit>, Status) {
        (None, Status::WrongState)
    }

    fn drain(&self, _input: usize) -> Status {
        self.drains.fetch_add(1, Ordering::Relaxed);
        Status::Ok
    }

    fn input_slot_count(&self) -> usize {
        1
    }

    fn output_slot_count(&self) -> usize {
        0
    }
}

/// Two inputs merged into one output; ends once both inputs ended.
#[derive(Default)]
pub struct Merger {
    state: Mutex<MergeState>,
}

#[derive(Default)]
struct MergeState {
    units: VecDeque<DataUnit>,
    ended: [bool; 2],
}

impl Element for Merger {
    fn submit_input(&self, data: &DataUnit, _input: usize) -> Status {
        let mut state = self.state.lock();
        if state.units.len() >= 4 {
            return Status::InputFull;
        }
        state.units.push_back(data.clone());
        Status::Ok
    }

    fn query_output(&self, _output: usize) -> (Option<DataUnit>, Status) {
        let mut state = self.state.lock();
        match state.units.pop_front() {
            Some(unit) => (Some(unit), Status::Ok),
            None if state.ended.iter().all(|e| *e) => (None, Status::Eof),
            None => (None, Status::Repeat),
        }
    }

    fn drain(&self, input: usize) -> Status {
        if let Some(ended) = self.state.lock().ended.get_mut(input) {
            *ended = true;
        }
        Status::Ok
    }

    fn input_slot_count(&self) -> usize {
        2
    }

    fn output_slot_count(&self) -> usize {
        1
    }
}

/// Sink that records every unit but answers its drain with `InputFull`
/// until released, holding its end of stream back.
#[derive(Default)]
pub struct EofGatedSink {
    released: AtomicBool,
    received: Mutex<Vec<u64>>,
    pub drain_attempts: AtomicU64,
    pub drains: AtomicU64,
}

impl EofGatedSink {
    pub fn release(&self) {
        self.released.store(true, Ordering::Release);
    }

    pub fn received(&self) -> Vec<u64> {
        self.received.lock().clone()
    }
}

impl Element for EofGatedSink {
    fn submit_input(&self, data: &DataUnit, _input: usize) -> Status {
        if let Some(seq) = data.payload::<u64>() {
            self.received.lock().push(*seq);
        }
        Status::Ok
    }

    fn query_output(&self, _output: usize) -> (Option<DataUnit>, Status) {
        (None, Status::WrongState)
    }

    fn drain(&self, _input: usize) -> Status {
        self.drain_attempts.fetch_add(1, Ordering::Relaxed);
        if !self.released.load(Ordering::Acquire) {
            return Status::InputFull;
        }
        self.drains.fetch_add(1, Ordering::Relaxed);
        Status::Ok
    }

    fn input_slot_count(&self) -> usize {
        1
    }

    fn output_slot_count(&self) -> usize {
        0
    }
}
