use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::models::format::CaptureFormat;
use crate::models::recording_result::RecordingResult;
use crate::processing::wav_format;
use crate::traits::delivery::DeliveryCallback;

/// Streaming WAV file writer.
///
/// ```text
/// [44-byte WAV header, sizes zero until finalize]
/// [interleaved sample data...]
/// ```
///
/// Sizes are backpatched in place by [`WavFileWriter::finalize`]; a writer
/// that is dropped without finalizing leaves a header announcing zero bytes.
pub struct WavFileWriter {
    file_path: PathBuf,
    format: CaptureFormat,
    file: BufWriter<File>,
    data_bytes: u64,
}

impl WavFileWriter {
    /// Create (or truncate) `file_path` and write the placeholder header.
    pub fn create(file_path: impl Into<PathBuf>, format: CaptureFormat) -> Result<Self, CaptureError> {
        let file_path = file_path.into();

        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&file_path).map_err(|e| {
            CaptureError::StorageError(format!("failed to create {}: {}", file_path.display(), e))
        })?;
        let mut file = BufWriter::new(file);
        file.write_all(&wav_format::generate_wav_header(&format, 0))
            .map_err(|e| CaptureError::StorageError(format!("failed to write header: {}", e)))?;

        Ok(Self {
            file_path,
            format,
            file,
            data_bytes: 0,
        })
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        self.file
            .write_all(data)
            .map_err(|e| CaptureError::StorageError(format!("write failed: {}", e)))?;
        self.data_bytes += data.len() as u64;
        Ok(())
    }

    /// Bytes of sample data written so far, header excluded.
    pub fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn format(&self) -> &CaptureFormat {
        &self.format
    }

    /// Patch the header sizes, close the file and checksum it.
    pub fn finalize(mut self) -> Result<RecordingResult, CaptureError> {
        self.patch_sizes()
            .map_err(|e| CaptureError::StorageError(format!("failed to finalize header: {}", e)))?;
        drop(self.file);

        let checksum = sha256_file(&self.file_path)?;
        log::info!(
            "finalized {} ({} data bytes, sha256 {})",
            self.file_path.display(),
            self.data_bytes,
            checksum
        );

        Ok(RecordingResult {
            duration_secs: self.format.duration_of(self.data_bytes),
            file_path: self.file_path,
            data_bytes: self.data_bytes,
            format: self.format,
            checksum,
            created_at: chrono::Utc::now(),
        })
    }

    fn patch_sizes(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let file = self.file.get_mut();
        for (offset, bytes) in wav_format::size_patches(self.data_bytes) {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&bytes)?;
        }
        file.seek(SeekFrom::End(0))?;
        file.sync_all()
    }
}

/// A [`WavFileWriter`] shared with the drain thread through a delivery callback.
///
/// Write failures cannot be returned from the callback; the first one is kept
/// and reported by [`WavSink::finish`], later batches are dropped.
#[derive(Clone)]
pub struct WavSink {
    inner: Arc<Mutex<SinkState>>,
}

struct SinkState {
    writer: Option<WavFileWriter>,
    error: Option<CaptureError>,
}

impl WavSink {
    pub fn create(file_path: impl Into<PathBuf>, format: CaptureFormat) -> Result<Self, CaptureError> {
        let writer = WavFileWriter::create(file_path, format)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(SinkState {
                writer: Some(writer),
                error: None,
            })),
        })
    }

    /// Callback that appends every delivered batch to the file.
    pub fn callback(&self) -> DeliveryCallback {
        let inner = Arc::clone(&self.inner);
        Arc::new(move |data: &[u8]| {
            let mut state = inner.lock();
            if state.error.is_some() {
                return;
            }
            let result = match state.writer.as_mut() {
                Some(writer) => writer.write(data),
                None => return,
            };
            if let Err(e) = result {
                log::error!("dropping captured audio: {}", e);
                state.error = Some(e);
            }
        })
    }

    pub fn data_bytes(&self) -> u64 {
        self.inner.lock().writer.as_ref().map_or(0, WavFileWriter::data_bytes)
    }

    /// Finalize the file. Batches delivered afterwards are ignored.
    pub fn finish(&self) -> Result<RecordingResult, CaptureError> {
        let (writer, error) = {
            let mut state = self.inner.lock();
            (state.writer.take(), state.error.take())
        };
        let writer = writer.ok_or_else(|| CaptureError::StorageError("recording already finalized".into()))?;
        let result = writer.finalize()?;
        match error {
            Some(e) => Err(e),
            None => Ok(result),
        }
    }
}

/// Compute the SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let mut file =
        File::open(path).map_err(|e| CaptureError::StorageError(format!("failed to open file for checksum: {}", e)))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| CaptureError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
