//! Process-loopback activation through `ActivateAudioInterfaceAsync`.
//!
//! The platform completes the request on one of its own worker threads and
//! reports back through an `IActivateAudioInterfaceCompletionHandler`. The
//! handler only flips the shared [`CompletionSignal`]; the result is read on
//! the requesting thread by [`DeviceActivator`](process_loopback_core::DeviceActivator).

use std::sync::Arc;

use windows::core::{Interface, HRESULT};
use windows::Win32::Media::Audio::{
    ActivateAudioInterfaceAsync, IActivateAudioInterfaceAsyncOperation, IActivateAudioInterfaceCompletionHandler,
    IActivateAudioInterfaceCompletionHandler_Impl, IAudioClient, AUDIOCLIENT_ACTIVATION_PARAMS,
    AUDIOCLIENT_ACTIVATION_PARAMS_0, AUDIOCLIENT_ACTIVATION_TYPE_PROCESS_LOOPBACK,
    AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS, PROCESS_LOOPBACK_MODE_EXCLUDE_TARGET_PROCESS_TREE,
    PROCESS_LOOPBACK_MODE_INCLUDE_TARGET_PROCESS_TREE, VIRTUAL_AUDIO_DEVICE_PROCESS_LOOPBACK,
};
use windows::Win32::System::Variant::VT_BLOB;
use windows_core::{implement, IUnknown};

use process_loopback_core::activation::activator::{ActivationRequest, PendingActivation};
use process_loopback_core::activation::completion::CompletionSignal;
use process_loopback_core::models::error::StatusCode;
use process_loopback_core::models::target::{LoopbackMode, TargetProcess};

/// `PROPVARIANT` holding a `VT_BLOB`, laid out like the system struct.
///
/// Only the tag and the blob are read by the activation call.
#[repr(C)]
struct BlobPropVariant {
    vt: u16,
    reserved1: u16,
    reserved2: u16,
    reserved3: u16,
    cb_size: u32,
    blob_data: *mut u8,
}

/// Request for an `IAudioClient` scoped to one process tree.
pub struct ProcessLoopbackRequest {
    params: AUDIOCLIENT_ACTIVATION_PARAMS,
}

impl ProcessLoopbackRequest {
    pub fn new(target: &TargetProcess) -> Self {
        let mode = match target.mode() {
            LoopbackMode::IncludeTree => PROCESS_LOOPBACK_MODE_INCLUDE_TARGET_PROCESS_TREE,
            LoopbackMode::ExcludeTree => PROCESS_LOOPBACK_MODE_EXCLUDE_TARGET_PROCESS_TREE,
        };
        Self {
            params: AUDIOCLIENT_ACTIVATION_PARAMS {
                ActivationType: AUDIOCLIENT_ACTIVATION_TYPE_PROCESS_LOOPBACK,
                Anonymous: AUDIOCLIENT_ACTIVATION_PARAMS_0 {
                    ProcessLoopbackParams: AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS {
                        TargetProcessId: target.process_id(),
                        ProcessLoopbackMode: mode,
                    },
                },
            },
        }
    }
}

impl ActivationRequest for ProcessLoopbackRequest {
    type Pending = PendingLoopbackActivation;

    fn issue(mut self, completion: Arc<CompletionSignal>) -> Result<PendingLoopbackActivation, StatusCode> {
        let handler: IActivateAudioInterfaceCompletionHandler = CompletionHandler { completion }.into();

        // The activation parameters are copied before the call returns.
        let prop = BlobPropVariant {
            vt: VT_BLOB.0,
            reserved1: 0,
            reserved2: 0,
            reserved3: 0,
            cb_size: size_of::<AUDIOCLIENT_ACTIVATION_PARAMS>() as u32,
            blob_data: (&mut self.params as *mut AUDIOCLIENT_ACTIVATION_PARAMS).cast::<u8>(),
        };
        let prop_ptr = (&prop as *const BlobPropVariant).cast();

        let operation = unsafe {
            ActivateAudioInterfaceAsync(VIRTUAL_AUDIO_DEVICE_PROCESS_LOOPBACK, &IAudioClient::IID, Some(prop_ptr), &handler)
        }
        .map_err(|e| e.code().0)?;

        Ok(PendingLoopbackActivation {
            operation,
            _handler: handler,
        })
    }
}

/// An issued activation; the handler is kept alive until the result is read.
pub struct PendingLoopbackActivation {
    operation: IActivateAudioInterfaceAsyncOperation,
    _handler: IActivateAudioInterfaceCompletionHandler,
}

impl PendingActivation for PendingLoopbackActivation {
    type Handle = IAudioClient;

    fn result(self) -> (StatusCode, Option<IAudioClient>) {
        let mut status = HRESULT(0);
        let mut activated: Option<IUnknown> = None;
        if let Err(e) = unsafe { self.operation.GetActivateResult(&mut status, &mut activated) } {
            return (e.code().0, None);
        }
        if status.is_err() {
            return (status.0, None);
        }
        match activated.map(|unknown| unknown.cast::<IAudioClient>()) {
            Some(Ok(client)) => (status.0, Some(client)),
            Some(Err(e)) => (e.code().0, None),
            None => (status.0, None),
        }
    }
}

#[implement(IActivateAudioInterfaceCompletionHandler)]
struct CompletionHandler {
    completion: Arc<CompletionSignal>,
}

impl IActivateAudioInterfaceCompletionHandler_Impl for CompletionHandler_Impl {
    fn ActivateCompleted(
        &self,
        _operation: windows_core::Ref<'_, IActivateAudioInterfaceAsyncOperation>,
    ) -> windows_core::Result<()> {
        self.completion.notify();
        Ok(())
    }
}
