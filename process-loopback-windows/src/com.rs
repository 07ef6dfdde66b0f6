use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

/// Joins the calling thread to the multithreaded apartment for its lifetime.
///
/// `CoUninitialize` is only called if initialization succeeded, and must run
/// on the same thread, so the guard is neither `Send` nor `Sync`.
pub struct ComGuard {
    initialized: bool,
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ComGuard {
    pub fn initialize_mta() -> Self {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr.is_err() {
            // RPC_E_CHANGED_MODE: the thread already lives in an STA, which
            // still lets us use free-threaded audio interfaces.
            log::warn!("CoInitializeEx(MTA) failed (status {:#010x})", hr.0);
        }
        Self {
            initialized: hr.is_ok(),
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                CoUninitialize();
            }
        }
    }
}
