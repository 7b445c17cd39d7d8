use serde::{Deserialize, Serialize};

/// Counters the processing loop accumulates over one run, reported to the
/// user at exit.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct RunStats {
    pub total_packets: u64,
    pub skipped_packets: u64,
}

impl RunStats {
    pub fn skip_percentage(&self) -> f64 {
        if self.total_packets == 0 {
            0.0
        } else {
            self.skipped_packets as f64 * 100.0 / self.total_packets as f64
        }
    }
}
