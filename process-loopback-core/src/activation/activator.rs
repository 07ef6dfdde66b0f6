use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::completion::CompletionSignal;
use crate::models::error::{is_failure, ActivationError, StatusCode};

/// An asynchronous activation request that has not been issued yet.
pub trait ActivationRequest {
    type Pending: PendingActivation;

    /// Hand the request to the platform.
    ///
    /// `completion` must be notified once the platform reports that the
    /// operation finished, from whatever thread it reports on.
    fn issue(self, completion: Arc<CompletionSignal>) -> Result<Self::Pending, StatusCode>;
}

/// An issued activation whose result can be read once it completed.
pub trait PendingActivation {
    type Handle;

    /// The signed result code and, on success, the activated handle.
    fn result(self) -> (StatusCode, Option<Self::Handle>);
}

/// Turns the platform's callback-driven activation into a blocking call.
///
/// The completion latch is reset before every request. A request that timed
/// out keeps its latch; the activator switches to a fresh one so a late
/// completion cannot satisfy the next wait.
#[derive(Debug, Default)]
pub struct DeviceActivator {
    completion: Mutex<Arc<CompletionSignal>>,
}

impl DeviceActivator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue `request` and block until it completes, or until `timeout` elapses.
    pub fn activate<R: ActivationRequest>(
        &self,
        request: R,
        timeout: Option<Duration>,
    ) -> Result<<R::Pending as PendingActivation>::Handle, ActivationError> {
        let completion = {
            let completion = self.completion.lock();
            completion.reset();
            Arc::clone(&completion)
        };

        let pending = request
            .issue(Arc::clone(&completion))
            .map_err(ActivationError::RequestFailed)?;

        if !completion.wait(timeout) {
            *self.completion.lock() = Arc::new(CompletionSignal::new());
            let waited = timeout.unwrap_or_default();
            log::warn!("audio interface activation still pending after {:?}", waited);
            return Err(ActivationError::TimedOut(waited));
        }

        let (status, handle) = pending.result();
        if is_failure(status) {
            return Err(ActivationError::Rejected(status));
        }
        handle.ok_or(ActivationError::NoInterface)
    }
}
