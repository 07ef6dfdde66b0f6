//! # process-loopback-core
//!
//! Platform-agnostic core of a per-process loopback audio recorder.
//!
//! Captures the audio rendered by one process tree (or everything except one
//! process tree) and hands it to a delivery callback in the configured PCM
//! format. Platform backends implement the [`AudioSubsystem`] family of
//! traits and plug into the generic [`CaptureEngine`].
//!
//! ## Architecture
//!
//! ```text
//! process-loopback-core (this crate)
//! ├── traits/       ← AudioSubsystem, LoopbackClient, CaptureBuffer, SampleReadySignal, DeliveryCallback
//! ├── models/       ← CaptureError, CaptureState, CaptureFormat, TargetProcess, CaptureConfiguration
//! ├── activation/   ← DeviceActivator (blocking wrapper over async activation)
//! ├── processing/   ← warm-up skip, WAV header generation and parsing
//! ├── session/      ← CaptureEngine and its drain loop
//! └── storage/      ← WavFileWriter, WavSink, metadata sidecar
//! ```

pub mod activation;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience.
pub use activation::activator::{ActivationRequest, DeviceActivator, PendingActivation};
pub use activation::completion::CompletionSignal;
pub use models::config::{CaptureConfiguration, DEFAULT_ACTIVATION_TIMEOUT, DEFAULT_WARMUP};
pub use models::diagnostics::CaptureDiagnostics;
pub use models::error::{ActivationError, CaptureError, StatusCode};
pub use models::format::{CaptureFormat, SampleEncoding};
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::state::CaptureState;
pub use models::target::{LoopbackMode, TargetProcess};
pub use session::engine::CaptureEngine;
pub use storage::wav_writer::{WavFileWriter, WavSink};
pub use traits::audio_subsystem::{AudioSubsystem, CaptureBuffer, LoopbackClient, SampleReadySignal};
pub use traits::delivery::DeliveryCallback;
