use std::time::Duration;

use crate::models::error::{ActivationError, StatusCode};
use crate::models::format::CaptureFormat;
use crate::models::target::TargetProcess;

/// Entry point into the platform audio stack.
///
/// Implemented by:
/// - `WasapiSubsystem` (Windows, process loopback via `ActivateAudioInterfaceAsync`)
/// - the in-memory backend used by the engine tests
pub trait AudioSubsystem: Send + Sync + 'static {
    type Client: LoopbackClient;

    /// Restores the previous scheduling characteristics when dropped.
    type PriorityGuard;

    /// Activate an audio client scoped to `target`'s render streams.
    ///
    /// Blocks until the platform reports completion or `timeout` elapses;
    /// `None` waits indefinitely.
    fn activate(&self, target: &TargetProcess, timeout: Option<Duration>) -> Result<Self::Client, ActivationError>;

    /// Raise the calling thread's priority for real-time audio work.
    ///
    /// Called on the drain thread; the guard is dropped when the loop exits.
    fn raise_thread_priority(&self) -> Self::PriorityGuard;
}

/// An activated audio client (an `IAudioClient` on Windows).
///
/// Dropping the client releases the underlying session handle.
pub trait LoopbackClient: Send + 'static {
    type Buffer: CaptureBuffer;
    type Signal: SampleReadySignal;

    /// Initialize a shared-mode, event-driven loopback stream in `format`.
    fn initialize(&mut self, format: &CaptureFormat) -> Result<(), StatusCode>;

    /// Acquire the buffer-access sub-interface.
    fn capture_buffer(&mut self) -> Result<Self::Buffer, StatusCode>;

    /// Create the sample-ready signal and bind it to the stream.
    fn bind_sample_ready_event(&mut self) -> Result<Self::Signal, StatusCode>;

    fn start(&mut self) -> Result<(), StatusCode>;

    fn stop(&mut self) -> Result<(), StatusCode>;

    /// Flush the stream; only legal while stopped.
    fn reset(&mut self) -> Result<(), StatusCode>;
}

/// Buffer-access sub-interface (an `IAudioCaptureClient` on Windows).
pub trait CaptureBuffer: Send + 'static {
    /// Pull the next packet, hand its `frames × block_align` bytes to `sink`,
    /// then release the packet back to the device.
    ///
    /// Returns the frame count of the packet, or `None` when no packet is
    /// available. Packets the device flags as silent reach `sink` as zeros.
    /// An error may follow a `sink` call when releasing the packet fails; the
    /// bytes already handed over stay valid.
    fn read_packet(&mut self, block_align: usize, sink: &mut dyn FnMut(&[u8])) -> Result<Option<u32>, StatusCode>;
}

/// Binary, edge-triggered event set by the platform when samples are ready.
///
/// The signal closes its handle when dropped.
pub trait SampleReadySignal: Send + Sync + 'static {
    /// Wait until signaled or `timeout` elapses. Returns true when signaled.
    fn wait(&self, timeout: Duration) -> bool;

    /// Clear a pending signal.
    fn reset(&self);
}
