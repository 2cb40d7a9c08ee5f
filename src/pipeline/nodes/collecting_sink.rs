//! CollectingSink: records the sequence numbers it receives.
//!
//! Counts how many times its input was drained, which is how tests check
//! that end of stream arrives exactly once. An optional per-unit delay makes
//! it a slow consumer.

use crate::pipeline::element::Element;
use crate::pipeline::status::Status;
use crate::pipeline::unit::DataUnit;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct CollectingSink {
    delay: Duration,
    received: Mutex<Vec<u64>>,
    /// Units whose payload was not a sequence number.
    foreign: AtomicU64,
    eof_count: AtomicU64,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sequence numbers in arrival order.
    pub fn received(&self) -> Vec<u64> {
        self.received.lock().clone()
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().len()
    }

    pub fn eof_count(&self) -> u64 {
        self.eof_count.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        self.received.lock().clear();
        self.eof_count.store(0, Ordering::Release);
    }
}

impl Element for CollectingSink {
    fn submit_input(&self, data: &DataUnit, input: usize) -> Status {
        if input != 0 {
            return Status::WrongState;
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        match data.payload::<u64>() {
            Some(seq) => self.received.lock().push(*seq),
            None => {
                self.foreign.fetch_add(1, Ordering::Relaxed);
            }
        }
        Status::Ok
    }

    fn query_output(&self, _output: usize) -> (Option<DataUnit>, Status) {
        (None, Status::WrongState)
    }

    fn drain(&self, _input: usize) -> Status {
        self.eof_count.fetch_add(1, Ordering::AcqRel);
        Status::Ok
    }

    fn input_slot_count(&self) -> usize {
        1
    }

    fn output_slot_count(&self) -> usize {
        0
    }

    fn display_result(&self) -> Option<String> {
        Some(format!(
            "sink received={} eof={}",
            self.received_count(),
            self.eof_count()
        ))
    }
}
