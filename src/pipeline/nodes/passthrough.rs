//! Passthrough: forwards units unchanged through a small internal buffer.
//!
//! Stands in for a hardware-paced stage: the buffer holds at most
//! `capacity` units and answers `InputFull` beyond that, so upstream slots
//! have to retry. An optional per-unit delay simulates processing cost.

use crate::pipeline::element::Element;
use crate::pipeline::status::Status;
use crate::pipeline::unit::DataUnit;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
struct Buffer {
    units: VecDeque<DataUnit>,
    draining: bool,
}

pub struct Passthrough {
    capacity: usize,
    delay: Duration,
    buffer: Mutex<Buffer>,
    forwarded: AtomicU64,
    flushed: AtomicU64,
}

impl Passthrough {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            delay: Duration::ZERO,
            buffer: Mutex::new(Buffer::default()),
            forwarded: AtomicU64::new(0),
            flushed: AtomicU64::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn buffered(&self) -> usize {
        self.buffer.lock().units.len()
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }
}

impl Element for Passthrough {
    fn submit_input(&self, data: &DataUnit, input: usize) -> Status {
        if input != 0 {
            return Status::WrongState;
        }
        {
            let mut buffer = self.buffer.lock();
            if buffer.draining {
                return Status::WrongState;
            }
            if buffer.units.len() >= self.capacity {
                return Status::InputFull;
            }
            buffer.units.push_back(data.clone());
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Status::Ok
    }

    fn query_output(&self, output: usize) -> (Option<DataUnit>, Status) {
        if output != 0 {
            return (None, Status::WrongState);
        }
        let mut buffer = self.buffer.lock();
        match buffer.units.pop_front() {
            Some(unit) => {
                self.forwarded.fetch_add(1, Ordering::Relaxed);
                (Some(unit), Status::Ok)
            }
            None if buffer.draining => (None, Status::Eof),
            None => (None, Status::Repeat),
        }
    }

    fn drain(&self, _input: usize) -> Status {
        self.buffer.lock().draining = true;
        Status::Ok
    }

    fn input_slot_count(&self) -> usize {
        1
    }

    fn output_slot_count(&self) -> usize {
        1
    }

    fn flush(&self) -> Status {
        let mut buffer = self.buffer.lock();
        let dropped = buffer.units.len() as u64;
        buffer.units.clear();
        self.flushed.fetch_add(dropped, Ordering::Relaxed);
        Status::Ok
    }

    fn restart(&self) -> Status {
        *self.buffer.lock() = Buffer::default();
        Status::Ok
    }

    fn display_result(&self) -> Option<String> {
        Some(format!(
            "passthrough forwarded={} flushed={}",
            self.forwarded(),
            self.flushed.load(Ordering::Relaxed)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applies_backpressure_at_capacity() {
        let element = Passthrough::new(2);
        assert_eq!(element.submit_input(&DataUnit::new(0u64), 0), Status::Ok);
        assert_eq!(element.submit_input(&DataUnit::new(1u64), 0), Status::Ok);
        assert_eq!(element.submit_input(&DataUnit::new(2u64), 0), Status::InputFull);

        let (unit, status) = element.query_output(0);
        assert_eq!(status, Status::Ok);
        assert_eq!(unit.unwrap().payload::<u64>(), Some(&0));
        assert_eq!(element.submit_input(&DataUnit::new(2u64), 0), Status::Ok);
    }

    #[test]
    fn test_eof_only_after_buffer_empties() {
        let element = Passthrough::new(4);
        element.submit_input(&DataUnit::new(7u64), 0);
        element.drain(0);

        assert_eq!(element.query_output(0).1, Status::Ok);
        assert_eq!(element.query_output(0).1, Status::Eof);
    }

    #[test]
    fn test_empty_buffer_is_repeat() {
        let element = Passthrough::new(1);
        assert_eq!(element.query_output(0).1, Status::Repeat);
    }

    #[test]
    fn test_flush_drops_buffered_units() {
        let element = Passthrough::new(4);
        element.submit_input(&DataUnit::new(1u64), 0);
        element.submit_input(&DataUnit::new(2u64), 0);
        element.flush();
        assert_eq!(element.buffered(), 0);
        assert_eq!(element.query_output(0).1, Status::Repeat);
    }
}
