use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Single-shot, resettable completion latch.
///
/// Bridges a platform completion callback (fired on an arbitrary thread) to a
/// caller that blocks until it fires. Once notified it stays notified until
/// `reset`, so a notification that lands before the caller starts waiting is
/// not lost.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    notified: Mutex<bool>,
    condvar: Condvar,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the operation complete and wake every waiter.
    pub fn notify(&self) {
        let mut notified = self.notified.lock();
        *notified = true;
        self.condvar.notify_all();
    }

    /// Re-arm the latch for the next operation.
    pub fn reset(&self) {
        *self.notified.lock() = false;
    }

    pub fn is_notified(&self) -> bool {
        *self.notified.lock()
    }

    /// Block until notified. With a timeout, returns false if it elapsed first.
    ///
    /// A timeout too large to express as a deadline waits without a limit.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut notified = self.notified.lock();
        while !*notified {
            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut notified, deadline).timed_out() {
                        return *notified;
                    }
                }
                None => self.condvar.wait(&mut notified),
            }
        }
        true
    }
}
