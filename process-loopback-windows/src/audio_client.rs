use windows::Win32::Media::Audio::{
    IAudioCaptureClient, IAudioClient, AUDCLNT_SHAREMODE_SHARED, AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM,
    AUDCLNT_STREAMFLAGS_EVENTCALLBACK, AUDCLNT_STREAMFLAGS_LOOPBACK, AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY,
    WAVEFORMATEX,
};

use process_loopback_core::models::error::StatusCode;
use process_loopback_core::models::format::CaptureFormat;
use process_loopback_core::traits::audio_subsystem::LoopbackClient;

use crate::capture_buffer::WasapiCaptureBuffer;
use crate::event::WasapiEvent;

/// Requested device buffer, in 100 ns units (20 ms).
const BUFFER_DURATION_HNS: i64 = 200_000;

/// Activated process-loopback `IAudioClient`.
pub struct WasapiClient {
    client: IAudioClient,
}

// SAFETY: the client is activated from an MTA thread; the interface is
// free-threaded and the engine serializes every call on it.
unsafe impl Send for WasapiClient {}

impl WasapiClient {
    pub fn new(client: IAudioClient) -> Self {
        Self { client }
    }
}

/// Build the `WAVEFORMATEX` the stream is initialized with.
pub fn wave_format(format: &CaptureFormat) -> WAVEFORMATEX {
    WAVEFORMATEX {
        wFormatTag: format.encoding().format_tag(),
        nChannels: format.channels(),
        nSamplesPerSec: format.sample_rate(),
        nAvgBytesPerSec: format.avg_bytes_per_sec(),
        nBlockAlign: format.block_align(),
        wBitsPerSample: format.bit_depth(),
        cbSize: 0,
    }
}

impl LoopbackClient for WasapiClient {
    type Buffer = WasapiCaptureBuffer;
    type Signal = WasapiEvent;

    fn initialize(&mut self, format: &CaptureFormat) -> Result<(), StatusCode> {
        let wave_format = wave_format(format);
        unsafe {
            self.client.Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                AUDCLNT_STREAMFLAGS_LOOPBACK
                    | AUDCLNT_STREAMFLAGS_EVENTCALLBACK
                    | AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM
                    | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY,
                BUFFER_DURATION_HNS,
                0,
                &wave_format,
                None,
            )
        }
        .map_err(|e| e.code().0)
    }

    fn capture_buffer(&mut self) -> Result<WasapiCaptureBuffer, StatusCode> {
        let capture_client: IAudioCaptureClient = unsafe { self.client.GetService() }.map_err(|e| e.code().0)?;
        Ok(WasapiCaptureBuffer::new(capture_client))
    }

    fn bind_sample_ready_event(&mut self) -> Result<WasapiEvent, StatusCode> {
        let event = WasapiEvent::new()?;
        unsafe { self.client.SetEventHandle(event.handle()) }.map_err(|e| e.code().0)?;
        Ok(event)
    }

    fn start(&mut self) -> Result<(), StatusCode> {
        unsafe { self.client.Start() }.map_err(|e| e.code().0)
    }

    fn stop(&mut self) -> Result<(), StatusCode> {
        unsafe { self.client.Stop() }.map_err(|e| e.code().0)
    }

    fn reset(&mut self) -> Result<(), StatusCode> {
        unsafe { self.client.Reset() }.map_err(|e| e.code().0)
    }
}
