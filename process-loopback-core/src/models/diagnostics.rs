use std::time::Duration;

use super::error::StatusCode;

/// Counters maintained by the drain thread, readable while capturing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureDiagnostics {
    /// Longest single drain iteration (packet reads plus delivery).
    pub max_execution_time: Duration,
    /// Most recent failing status reported by any audio call.
    pub last_status: Option<StatusCode>,
    pub drain_iterations: u64,
    pub packets_read: u64,
    pub callbacks_delivered: u64,
    pub bytes_delivered: u64,
    /// Bytes discarded by the warm-up window.
    pub bytes_skipped: u64,
    pub read_errors: u64,
}

impl CaptureDiagnostics {
    pub fn record_execution_time(&mut self, elapsed: Duration) {
        if elapsed > self.max_execution_time {
            self.max_execution_time = elapsed;
        }
    }
}
