use std::time::Duration;

use super::error::CaptureError;
use super::format::{CaptureFormat, SampleEncoding};
use super::target::{LoopbackMode, TargetProcess};

/// Default warm-up window discarded after a resume.
pub const DEFAULT_WARMUP: Duration = Duration::from_millis(100);

/// Default bound on the activation handshake.
pub const DEFAULT_ACTIVATION_TIMEOUT: Duration = Duration::from_secs(5);

/// One-shot configuration for a capture engine.
///
/// Everything here can also be set piecemeal through the engine's setters;
/// this struct exists so front ends can build, validate and apply a whole
/// configuration at once.
#[derive(Debug, Clone)]
pub struct CaptureConfiguration {
    /// Sample rate in Hz (default: 48000).
    pub sample_rate: u32,

    /// Bits per sample (default: 16). Valid values: 8, 16, 24, 32.
    pub bit_depth: u16,

    /// Number of interleaved channels (default: 2).
    pub channels: u16,

    pub encoding: SampleEncoding,

    /// Process whose audio is captured. Zero means "not chosen yet".
    pub process_id: u32,

    pub mode: LoopbackMode,

    /// Deliver once every N signaled drain iterations (default: 1).
    pub callback_interval: u32,

    /// Audio discarded after each resume (default: 100 ms).
    pub warmup: Duration,

    /// Bound on the activation wait; `None` waits forever (default: 5 s).
    pub activation_timeout: Option<Duration>,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), CaptureError> {
        self.format()?;
        self.target()?;
        Ok(())
    }

    pub fn format(&self) -> Result<CaptureFormat, CaptureError> {
        CaptureFormat::with_encoding(self.encoding, self.sample_rate, self.bit_depth, self.channels)
    }

    pub fn target(&self) -> Result<TargetProcess, CaptureError> {
        TargetProcess::new(self.process_id, self.mode)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            bit_depth: 16,
            channels: 2,
            encoding: SampleEncoding::Pcm,
            process_id: 0,
            mode: LoopbackMode::IncludeTree,
            callback_interval: 1,
            warmup: DEFAULT_WARMUP,
            activation_timeout: Some(DEFAULT_ACTIVATION_TIMEOUT),
        }
    }
}
