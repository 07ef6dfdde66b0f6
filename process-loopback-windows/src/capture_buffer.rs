use windows::Win32::Media::Audio::{IAudioCaptureClient, AUDCLNT_BUFFERFLAGS_SILENT};

use process_loopback_core::models::error::StatusCode;
use process_loopback_core::traits::audio_subsystem::CaptureBuffer;

/// `IAudioCaptureClient` packet reader.
pub struct WasapiCaptureBuffer {
    capture_client: IAudioCaptureClient,
    silence: Vec<u8>,
}

// SAFETY: only the drain thread reads packets, behind the engine's mutex.
unsafe impl Send for WasapiCaptureBuffer {}

impl WasapiCaptureBuffer {
    pub fn new(capture_client: IAudioCaptureClient) -> Self {
        Self {
            capture_client,
            silence: Vec::new(),
        }
    }
}

impl CaptureBuffer for WasapiCaptureBuffer {
    fn read_packet(&mut self, block_align: usize, sink: &mut dyn FnMut(&[u8])) -> Result<Option<u32>, StatusCode> {
        let packet_length = unsafe { self.capture_client.GetNextPacketSize() }.map_err(|e| e.code().0)?;
        if packet_length == 0 {
            return Ok(None);
        }

        let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
        let mut num_frames: u32 = 0;
        let mut flags: u32 = 0;
        unsafe {
            self.capture_client
                .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                .map_err(|e| e.code().0)?;
        }

        let len = num_frames as usize * block_align;
        if len > 0 {
            if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 || buffer_ptr.is_null() {
                self.silence.clear();
                self.silence.resize(len, 0);
                sink(&self.silence);
            } else {
                // SAFETY: GetBuffer hands out `num_frames` frames of `block_align`
                // bytes, valid until ReleaseBuffer.
                let data = unsafe { std::slice::from_raw_parts(buffer_ptr, len) };
                sink(data);
            }
        }

        unsafe { self.capture_client.ReleaseBuffer(num_frames) }.map_err(|e| e.code().0)?;
        Ok(Some(num_frames))
    }
}
