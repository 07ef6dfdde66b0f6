use std::time::Duration;

use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows::Win32::System::Threading::{CreateEventW, ResetEvent, WaitForSingleObject};

use process_loopback_core::models::error::StatusCode;
use process_loopback_core::traits::audio_subsystem::SampleReadySignal;

/// Auto-reset Win32 event bound to the stream with `SetEventHandle`.
pub struct WasapiEvent {
    handle: HANDLE,
}

// SAFETY: event handles are process-wide kernel objects; waiting, resetting
// and closing them is legal from any thread.
unsafe impl Send for WasapiEvent {}
unsafe impl Sync for WasapiEvent {}

impl WasapiEvent {
    pub fn new() -> Result<Self, StatusCode> {
        let handle = unsafe { CreateEventW(None, false, false, None) }.map_err(|e| e.code().0)?;
        Ok(Self { handle })
    }

    pub fn handle(&self) -> HANDLE {
        self.handle
    }
}

impl SampleReadySignal for WasapiEvent {
    fn wait(&self, timeout: Duration) -> bool {
        let millis = timeout.as_millis().min(u32::MAX as u128 - 1) as u32;
        unsafe { WaitForSingleObject(self.handle, millis) == WAIT_OBJECT_0 }
    }

    fn reset(&self) {
        if let Err(e) = unsafe { ResetEvent(self.handle) } {
            log::warn!("ResetEvent failed: {}", e);
        }
    }
}

impl Drop for WasapiEvent {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.handle) } {
            log::warn!("CloseHandle on sample-ready event failed: {}", e);
        }
    }
}
