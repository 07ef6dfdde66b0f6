use std::time::Duration;

use process_loopback_core::activation::activator::DeviceActivator;
use process_loopback_core::models::error::ActivationError;
use process_loopback_core::models::target::TargetProcess;
use process_loopback_core::traits::audio_subsystem::AudioSubsystem;

use crate::activation::ProcessLoopbackRequest;
use crate::audio_client::WasapiClient;
use crate::com::ComGuard;
use crate::mmcss::MmcssGuard;

/// WASAPI process-loopback backend.
///
/// The thread driving the engine must have joined the MTA (see
/// [`ComGuard::initialize_mta`]) before starting a capture.
#[derive(Default)]
pub struct WasapiSubsystem {
    activator: DeviceActivator,
}

impl WasapiSubsystem {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Drain-thread setup: MTA membership plus MMCSS registration.
///
/// Fields drop in order, so MMCSS is reverted before COM is released.
pub struct RealtimeThreadGuard {
    _mmcss: MmcssGuard,
    _com: ComGuard,
}

impl AudioSubsystem for WasapiSubsystem {
    type Client = WasapiClient;
    type PriorityGuard = RealtimeThreadGuard;

    fn activate(&self, target: &TargetProcess, timeout: Option<Duration>) -> Result<WasapiClient, ActivationError> {
        log::debug!(
            "activating process loopback for pid {} ({:?})",
            target.process_id(),
            target.mode()
        );
        let client = self.activator.activate(ProcessLoopbackRequest::new(target), timeout)?;
        Ok(WasapiClient::new(client))
    }

    fn raise_thread_priority(&self) -> RealtimeThreadGuard {
        let com = ComGuard::initialize_mta();
        RealtimeThreadGuard {
            _mmcss: MmcssGuard::pro_audio(),
            _com: com,
        }
    }
}
