use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::format::CaptureFormat;
use super::target::TargetProcess;

/// Summary of a finalized WAV recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    /// Size of the `data` chunk in bytes.
    pub data_bytes: u64,
    pub duration_secs: f64,
    pub format: CaptureFormat,
    /// SHA-256 of the complete file, lowercase hex.
    pub checksum: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Sidecar metadata written next to a recording.
///
/// Serializable for JSON export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub file_path: String,
    pub process_id: u32,
    pub inclusive: bool,
    pub format: CaptureFormat,
    pub data_bytes: u64,
    pub duration_secs: f64,
    pub checksum: String,
    pub created_at: String,
}

impl RecordingMetadata {
    pub fn new(result: &RecordingResult, target: &TargetProcess) -> Self {
        Self {
            file_path: result.file_path.to_string_lossy().to_string(),
            process_id: target.process_id(),
            inclusive: target.is_inclusive(),
            format: result.format,
            data_bytes: result.data_bytes,
            duration_secs: result.duration_secs,
            checksum: result.checksum.clone(),
            created_at: result.created_at.to_rfc3339(),
        }
    }
}
