use serde::{Deserialize, Serialize};

use super::error::CaptureError;

pub const MIN_SAMPLE_RATE: u32 = 1000;
pub const MAX_CHANNELS: u16 = 1024;

/// Sample encoding carried in the `wFormatTag` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleEncoding {
    /// Integer PCM (format tag 1).
    #[default]
    Pcm,
    /// 32-bit IEEE float (format tag 3).
    IeeeFloat,
}

impl SampleEncoding {
    pub fn format_tag(&self) -> u16 {
        match self {
            Self::Pcm => 1,
            Self::IeeeFloat => 3,
        }
    }
}

/// Fixed-layout PCM format used for a capture session.
///
/// Fields are private so the derived values (`block_align`,
/// `avg_bytes_per_sec`) can never drift from the primary ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCaptureFormat", into = "RawCaptureFormat")]
pub struct CaptureFormat {
    encoding: SampleEncoding,
    sample_rate: u32,
    bit_depth: u16,
    channels: u16,
    block_align: u16,
    avg_bytes_per_sec: u32,
}

impl CaptureFormat {
    /// Integer PCM format.
    pub fn new(sample_rate: u32, bit_depth: u16, channels: u16) -> Result<Self, CaptureError> {
        Self::with_encoding(SampleEncoding::Pcm, sample_rate, bit_depth, channels)
    }

    pub fn with_encoding(
        encoding: SampleEncoding,
        sample_rate: u32,
        bit_depth: u16,
        channels: u16,
    ) -> Result<Self, CaptureError> {
        if sample_rate < MIN_SAMPLE_RATE {
            return Err(CaptureError::InvalidParameter(format!(
                "sample rate {} Hz is below {} Hz",
                sample_rate, MIN_SAMPLE_RATE
            )));
        }
        if bit_depth == 0 || bit_depth > 32 || bit_depth % 8 != 0 {
            return Err(CaptureError::InvalidParameter(format!("unsupported bit depth: {}", bit_depth)));
        }
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(CaptureError::InvalidParameter(format!("unsupported channel count: {}", channels)));
        }
        if encoding == SampleEncoding::IeeeFloat && bit_depth != 32 {
            return Err(CaptureError::InvalidParameter(format!(
                "float samples must be 32-bit, got {}",
                bit_depth
            )));
        }

        let block_align = bit_depth / 8 * channels;
        let avg_bytes_per_sec = sample_rate.checked_mul(block_align as u32).ok_or_else(|| {
            CaptureError::InvalidParameter(format!(
                "{} Hz x {} bytes per frame overflows the byte rate",
                sample_rate, block_align
            ))
        })?;

        Ok(Self {
            encoding,
            sample_rate,
            bit_depth,
            channels,
            block_align,
            avg_bytes_per_sec,
        })
    }

    pub fn encoding(&self) -> SampleEncoding {
        self.encoding
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Bytes per frame (one sample for every channel).
    pub fn block_align(&self) -> u16 {
        self.block_align
    }

    pub fn avg_bytes_per_sec(&self) -> u32 {
        self.avg_bytes_per_sec
    }

    /// Byte count of `seconds` worth of audio, rounded to whole frames.
    /// Saturates at `u64::MAX`.
    pub fn bytes_for_duration(&self, seconds: f64) -> u64 {
        if seconds.is_nan() || seconds <= 0.0 {
            return 0;
        }
        let frames = (self.sample_rate as f64 * seconds).round() as u64;
        frames.saturating_mul(self.block_align as u64)
    }

    /// Playback duration of `bytes` of audio in this format.
    pub fn duration_of(&self, bytes: u64) -> f64 {
        bytes as f64 / self.avg_bytes_per_sec as f64
    }
}

/// Serialized form of [`CaptureFormat`], re-validated on the way in.
#[derive(Serialize, Deserialize)]
struct RawCaptureFormat {
    encoding: SampleEncoding,
    sample_rate: u32,
    bit_depth: u16,
    channels: u16,
    block_align: u16,
    avg_bytes_per_sec: u32,
}

impl From<CaptureFormat> for RawCaptureFormat {
    fn from(format: CaptureFormat) -> Self {
        Self {
            encoding: format.encoding,
            sample_rate: format.sample_rate,
            bit_depth: format.bit_depth,
            channels: format.channels,
            block_align: format.block_align,
            avg_bytes_per_sec: format.avg_bytes_per_sec,
        }
    }
}

impl TryFrom<RawCaptureFormat> for CaptureFormat {
    type Error = CaptureError;

    fn try_from(raw: RawCaptureFormat) -> Result<Self, Self::Error> {
        let format = Self::with_encoding(raw.encoding, raw.sample_rate, raw.bit_depth, raw.channels)?;
        if format.block_align != raw.block_align || format.avg_bytes_per_sec != raw.avg_bytes_per_sec {
            return Err(CaptureError::InvalidParameter(format!(
                "block align {} / byte rate {} do not match {} Hz {}-bit x{}",
                raw.block_align, raw.avg_bytes_per_sec, raw.sample_rate, raw.bit_depth, raw.channels
            )));
        }
        Ok(format)
    }
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self {
            encoding: SampleEncoding::Pcm,
            sample_rate: 48000,
            bit_depth: 16,
            channels: 2,
            block_align: 4,
            avg_bytes_per_sec: 192_000,
        }
    }
}
