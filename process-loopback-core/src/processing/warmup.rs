/// Warm-up budget: bytes discarded from the head of the stream after a restart.
///
/// Devices often hand back a stale or garbage buffer right after the stream
/// is restarted; dropping a short window avoids an audible click. The budget
/// is consumed monotonically and never refilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WarmupSkip {
    remaining: u64,
}

impl WarmupSkip {
    pub fn new(bytes: u64) -> Self {
        Self { remaining: bytes }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Append `packet` to `out` after consuming whatever is left of the budget.
    ///
    /// Returns the number of bytes discarded from this packet.
    pub fn apply(&mut self, packet: &[u8], out: &mut Vec<u8>) -> usize {
        let skipped = (self.remaining.min(packet.len() as u64)) as usize;
        self.remaining -= skipped as u64;
        out.extend_from_slice(&packet[skipped..]);
        skipped
    }
}
