//! RIFF/WAVE header utilities.
//!
//! Generates the canonical 44-byte header for a capture format, parses it
//! back, and computes the size-field patches once the final data length is known.

use crate::models::error::CaptureError;
use crate::models::format::{CaptureFormat, SampleEncoding};

/// Size of the canonical WAV header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

const RIFF_SIZE_OFFSET: usize = 4;
const DATA_SIZE_OFFSET: usize = 40;

/// Generate a 44-byte WAV header for `format`.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    file size - 8 (36 + data_size)
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (format chunk size)
/// [20-21]  format tag (1 = PCM, 3 = IEEE float)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  avg_bytes_per_sec
/// [32-33]  block_align
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(format: &CaptureFormat, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let mut header = [0u8; WAV_HEADER_SIZE];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36u32.saturating_add(data_size)).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt sub-chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&format.encoding().format_tag().to_le_bytes());
    header[22..24].copy_from_slice(&format.channels().to_le_bytes());
    header[24..28].copy_from_slice(&format.sample_rate().to_le_bytes());
    header[28..32].copy_from_slice(&format.avg_bytes_per_sec().to_le_bytes());
    header[32..34].copy_from_slice(&format.block_align().to_le_bytes());
    header[34..36].copy_from_slice(&format.bit_depth().to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// The two size fields of a header describing `data_size` bytes of audio, as
/// `(file offset, little-endian value)` pairs for backpatching in place.
pub fn size_patches(data_size: u64) -> [(u64, [u8; 4]); 2] {
    let riff_size = clamp_u32(data_size.saturating_add(WAV_HEADER_SIZE as u64 - 8));
    [
        (RIFF_SIZE_OFFSET as u64, riff_size.to_le_bytes()),
        (DATA_SIZE_OFFSET as u64, clamp_u32(data_size).to_le_bytes()),
    ]
}

/// RIFF sizes are 32-bit; recordings past 4 GiB saturate instead of wrapping.
fn clamp_u32(value: u64) -> u32 {
    value.min(u32::MAX as u64) as u32
}

/// Fields of a parsed canonical WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub riff_size: u32,
    pub format: CaptureFormat,
    pub data_size: u32,
}

impl WavHeader {
    /// Parse a canonical 44-byte header.
    ///
    /// Format fields are re-validated, so a header whose derived fields
    /// disagree with its primary fields is rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self, CaptureError> {
        if bytes.len() < WAV_HEADER_SIZE {
            return Err(CaptureError::StorageError(format!(
                "WAV header needs {} bytes, got {}",
                WAV_HEADER_SIZE,
                bytes.len()
            )));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(CaptureError::StorageError("not a RIFF/WAVE file".into()));
        }
        if &bytes[12..16] != b"fmt " || read_u32(bytes, 16) != 16 {
            return Err(CaptureError::StorageError("unexpected fmt chunk layout".into()));
        }
        if &bytes[36..40] != b"data" {
            return Err(CaptureError::StorageError("data chunk does not follow fmt chunk".into()));
        }

        let encoding = match read_u16(bytes, 20) {
            1 => SampleEncoding::Pcm,
            3 => SampleEncoding::IeeeFloat,
            tag => return Err(CaptureError::StorageError(format!("unsupported format tag {}", tag))),
        };
        let format = CaptureFormat::with_encoding(encoding, read_u32(bytes, 24), read_u16(bytes, 34), read_u16(bytes, 22))
            .map_err(|e| CaptureError::StorageError(format!("invalid fmt chunk: {}", e)))?;

        if read_u32(bytes, 28) != format.avg_bytes_per_sec() || read_u16(bytes, 32) != format.block_align() {
            return Err(CaptureError::StorageError("fmt chunk derived fields are inconsistent".into()));
        }

        Ok(Self {
            riff_size: read_u32(bytes, 4),
            format,
            data_size: read_u32(bytes, 40),
        })
    }
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}
