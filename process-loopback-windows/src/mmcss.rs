use windows::core::w;
use windows::Win32::Foundation::HANDLE;
use windows::Win32::System::Threading::{AvRevertMmThreadCharacteristics, AvSetMmThreadCharacteristicsW};

/// Registers the calling thread with MMCSS under the "Pro Audio" task.
///
/// Registration failure is not fatal; the thread keeps its normal priority.
pub struct MmcssGuard {
    handle: Option<HANDLE>,
}

impl MmcssGuard {
    pub fn pro_audio() -> Self {
        let mut task_index: u32 = 0;
        match unsafe { AvSetMmThreadCharacteristicsW(w!("Pro Audio"), &mut task_index) } {
            Ok(handle) => {
                log::debug!("MMCSS registration ok (task index {})", task_index);
                Self { handle: Some(handle) }
            }
            Err(e) => {
                log::warn!("MMCSS registration failed: {}", e);
                Self { handle: None }
            }
        }
    }
}

impl Drop for MmcssGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = unsafe { AvRevertMmThreadCharacteristics(handle) } {
                log::warn!("AvRevertMmThreadCharacteristics failed: {}", e);
            }
        }
    }
}
