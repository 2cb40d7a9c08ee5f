//! CountingSource: emits `frames` numbered units, then EOF.
//!
//! Each unit carries its sequence number as a `u64` payload and a
//! presentation timestamp of `seq * interval`. With a non-zero interval the
//! source answers "nothing ready" until the next unit is due.

use crate::pipeline::element::Element;
use crate::pipeline::status::Status;
use crate::pipeline::unit::{DataUnit, PropertyValue};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Property set on the final unit of the stream.
pub const LAST_UNIT_PROPERTY: &str = "last";

pub struct CountingSource {
    frames: u64,
    interval: Duration,
    next: AtomicU64,
    last_emit: Mutex<Option<Instant>>,
}

impl CountingSource {
    pub fn new(frames: u64) -> Self {
        Self {
            frames,
            interval: Duration::ZERO,
            next: AtomicU64::new(0),
            last_emit: Mutex::new(None),
        }
    }

    /// Pace emission to one unit per `interval`.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Units handed out so far in the current stream.
    pub fn emitted(&self) -> u64 {
        self.next.load(Ordering::Acquire).min(self.frames)
    }

    fn due(&self) -> bool {
        if self.interval.is_zero() {
            return true;
        }
        let mut last = self.last_emit.lock();
        match *last {
            Some(at) if at.elapsed() < self.interval => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }
}

impl Element for CountingSource {
    fn submit_input(&self, _data: &DataUnit, _input: usize) -> Status {
        Status::WrongState
    }

    fn query_output(&self, output: usize) -> (Option<DataUnit>, Status) {
        if output != 0 {
            return (None, Status::WrongState);
        }
        if self.next.load(Ordering::Acquire) >= self.frames {
            return (None, Status::Eof);
        }
        if !self.due() {
            return (None, Status::Repeat);
        }

        let Ok(seq) = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.frames).then_some(n + 1)
            })
        else {
            return (None, Status::Eof);
        };
        let pts = presentation_time(self.interval, seq);
        let unit = DataUnit::with_timing(seq, pts, self.interval);
        if seq + 1 == self.frames {
            unit.set_property(LAST_UNIT_PROPERTY, PropertyValue::Bool(true));
        }
        (Some(unit), Status::Ok)
    }

    fn drain(&self, _input: usize) -> Status {
        Status::Ok
    }

    fn input_slot_count(&self) -> usize {
        0
    }

    fn output_slot_count(&self) -> usize {
        1
    }

    fn restart(&self) -> Status {
        self.next.store(0, Ordering::Release);
        *self.last_emit.lock() = None;
        Status::Ok
    }

    fn display_result(&self) -> Option<String> {
        Some(format!("source emitted={}/{}", self.emitted(), self.frames))
    }
}

/// `interval * seq`, saturating at `Duration::MAX`.
fn presentation_time(interval: Duration, seq: u64) -> Duration {
    let nanos = interval.as_nanos().saturating_mul(u128::from(seq));
    let secs = nanos / 1_000_000_000;
    match u64::try_from(secs) {
        Ok(secs) => Duration::new(secs, (nanos % 1_000_000_000) as u32),
        Err(_) => Duration::MAX,
    }
}
