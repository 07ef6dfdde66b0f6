use std::time::Duration;

use thiserror::Error;

/// Raw signed result code reported by the OS audio subsystem (an `HRESULT` on Windows).
///
/// Negative values are failures; zero and positive values are success codes.
pub type StatusCode = i32;

/// Returns true when `code` denotes a failure.
pub fn is_failure(code: StatusCode) -> bool {
    code < 0
}

/// Failures of the asynchronous "activate audio interface" handshake.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActivationError {
    /// The activation request could not be issued at all.
    #[error("activation request could not be issued (status {0:#010x})")]
    RequestFailed(StatusCode),

    /// The request completed, but the subsystem reported a failure code.
    #[error("activation rejected by the audio subsystem (status {0:#010x})")]
    Rejected(StatusCode),

    /// The completion reported success without handing back an interface.
    #[error("activation completed without an audio client")]
    NoInterface,

    #[error("activation did not complete within {0:?}")]
    TimedOut(Duration),
}

impl ActivationError {
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::RequestFailed(code) | Self::Rejected(code) => Some(*code),
            Self::NoInterface | Self::TimedOut(_) => None,
        }
    }
}

/// Errors returned by the capture engine and its collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("operation not allowed in the {0} state")]
    InvalidState(&'static str),

    #[error("capture format has not been set")]
    NotInitialized,

    #[error("capture format must be set before starting")]
    FormatNotSet,

    #[error("target process must be set before starting")]
    ProcessNotSet,

    #[error("device activation failed: {0}")]
    DeviceActivationFailed(#[source] ActivationError),

    #[error("audio session initialization failed (status {0:#010x})")]
    SessionInitFailed(StatusCode),

    #[error("capture service unavailable (status {0:#010x})")]
    ServiceUnavailable(StatusCode),

    #[error("sample-ready event setup failed (status {0:#010x})")]
    EventSetupFailed(StatusCode),

    #[error("audio session start failed (status {0:#010x})")]
    SessionStartFailed(StatusCode),

    #[error("audio session stop failed (status {0:#010x})")]
    SessionStopFailed(StatusCode),

    #[error("failed to spawn drain thread: {0}")]
    ThreadSpawnFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),
}

impl CaptureError {
    /// The OS status code behind this error, when there is one.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::DeviceActivationFailed(source) => source.status_code(),
            Self::SessionInitFailed(code)
            | Self::ServiceUnavailable(code)
            | Self::EventSetupFailed(code)
            | Self::SessionStartFailed(code)
            | Self::SessionStopFailed(code) => Some(*code),
            _ => None,
        }
    }

    /// True when activation completed but the subsystem refused the request.
    pub fn is_rejected_activation(&self) -> bool {
        matches!(self, Self::DeviceActivationFailed(ActivationError::Rejected(_)))
    }
}
