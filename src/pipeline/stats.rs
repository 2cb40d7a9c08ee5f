//! Statistics snapshots.

use crate::pipeline::executor::PipelineState;
use crate::pipeline::id::{ConnectorId, SlotId};
use crate::pipeline::queue::QueueStats;
use std::fmt;
use std::time::Duration;

/// Counters of one connector at the time of sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorStats {
    pub id: ConnectorId,
    pub submitted: u64,
    pub polled: u64,
    pub eof: bool,
    /// FIFO counters of every `ThreadQueue` output.
    pub queues: Vec<(SlotId, QueueStats)>,
    /// The element's own summary, if it provides one.
    pub result: Option<String>,
}

/// Whole-pipeline snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStats {
    pub state: PipelineState,
    pub processed_frames: u64,
    pub fps: f64,
    pub processing_time: Duration,
    pub connectors: Vec<ConnectorStats>,
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:?}: {} frames in {:.3}s ({:.1} fps)",
            self.state,
            self.processed_frames,
            self.processing_time.as_secs_f64(),
            self.fps
        )?;
        for c in &self.connectors {
            write!(
                f,
                "  {} submitted={} polled={} eof={}",
                c.id, c.submitted, c.polled, c.eof
            )?;
            for (slot, q) in &c.queues {
                write!(
                    f,
                    " [{} {}/{} pushed={} flushed={}]",
                    slot, q.current, q.capacity, q.total_pushed, q.total_flushed
                )?;
            }
            if let Some(result) = &c.result {
                write!(f, " {}", result)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_lists_connectors() {
        let stats = PipelineStats {
            state: PipelineState::Eof,
            processed_frames: 10,
            fps: 100.0,
            processing_time: Duration::from_millis(100),
            connectors: vec![ConnectorStats {
                id: ConnectorId(1),
                submitted: 10,
                polled: 0,
                eof: true,
                queues: Vec::new(),
                result: Some("received=10".into()),
            }],
        };
        let text = stats.to_string();
        assert!(text.starts_with("Eof: 10 frames"));
        assert!(text.contains("received=10"));
    }
}
