//! Splitter: one input fanned out to N outputs.
//!
//! Every accepted unit is shared (not copied) into one bounded buffer per
//! output. Input is refused while any branch's buffer is full, so the
//! slowest branch sets the pace without losing units on any branch.

use crate::pipeline::element::Element;
use crate::pipeline::status::Status;
use crate::pipeline::unit::DataUnit;
use parking_lot::Mutex;
use std::collections::VecDeque;

struct Branches {
    buffers: Vec<VecDeque<DataUnit>>,
    draining: bool,
}

pub struct Splitter {
    outputs: usize,
    capacity: usize,
    state: Mutex<Branches>,
}

impl Splitter {
    pub fn new(outputs: usize, capacity: usize) -> Self {
        let outputs = outputs.max(1);
        Self {
            outputs,
            capacity: capacity.max(1),
            state: Mutex::new(Branches {
                buffers: vec![VecDeque::new(); outputs],
                draining: false,
            }),
        }
    }

    /// Units waiting on each branch.
    pub fn backlog(&self) -> Vec<usize> {
        self.state.lock().buffers.iter().map(VecDeque::len).collect()
    }
}

impl Element for Splitter {
    fn submit_input(&self, data: &DataUnit, input: usize) -> Status {
        if input != 0 {
            return Status::WrongState;
        }
        let mut state = self.state.lock();
        if state.draining {
            return Status::WrongState;
        }
        if state.buffers.iter().any(|b| b.len() >= self.capacity) {
            return Status::InputFull;
        }
        for buffer in &mut state.buffers {
            buffer.push_back(data.clone());
        }
        Status::Ok
    }

    fn query_output(&self, output: usize) -> (Option<DataUnit>, Status) {
        let mut state = self.state.lock();
        let draining = state.draining;
        let Some(buffer) = state.buffers.get_mut(output) else {
            return (None, Status::WrongState);
        };
        match buffer.pop_front() {
            Some(unit) => (Some(unit), Status::Ok),
            None if draining => (None, Status::Eof),
            None => (None, Status::Repeat),
        }
    }

    fn drain(&self, _input: usize) -> Status {
        self.state.lock().draining = true;
        Status::Ok
    }

    fn input_slot_count(&self) -> usize {
        1
    }

    fn output_slot_count(&self) -> usize {
        self.outputs
    }

    fn flush(&self) -> Status {
        for buffer in &mut self.state.lock().buffers {
            buffer.clear();
        }
        Status::Ok
    }

    fn restart(&self) -> Status {
        let mut state = self.state.lock();
        for buffer in &mut state.buffers {
            buffer.clear();
        }
        state.draining = false;
        Status::Ok
    }

    fn display_result(&self) -> Option<String> {
        Some(format!("splitter backlog={:?}", self.backlog()))
    }
}
