//! In-memory audio backend for exercising the engine without a device.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::{ActivationError, StatusCode};
use crate::models::format::CaptureFormat;
use crate::models::target::TargetProcess;
use crate::traits::audio_subsystem::{AudioSubsystem, CaptureBuffer, LoopbackClient, SampleReadySignal};

/// Auto-reset event: a successful wait consumes the signal.
#[derive(Default)]
pub(crate) struct AutoResetEvent {
    set: Mutex<bool>,
    condvar: Condvar,
}

impl AutoResetEvent {
    pub fn fire(&self) {
        *self.set.lock() = true;
        self.condvar.notify_one();
    }

    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut set = self.set.lock();
        while !*set {
            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut set, deadline).timed_out() {
                        break;
                    }
                }
                None => self.condvar.wait(&mut set),
            }
        }
        std::mem::replace(&mut *set, false)
    }

    fn clear(&self) {
        *self.set.lock() = false;
    }
}

/// State shared by every object the mock subsystem hands out.
#[derive(Default)]
pub(crate) struct MockShared {
    pub packets: Mutex<VecDeque<Vec<u8>>>,
    /// Returned by the next read once the packet queue is empty.
    pub read_failure: Mutex<Option<StatusCode>>,
    /// Packet number whose release fails with the given status, after the
    /// packet reached the sink.
    pub release_failure: Mutex<Option<(usize, StatusCode)>>,
    pub packets_read: AtomicUsize,

    pub activation_failure: Mutex<Option<ActivationError>>,
    pub initialize_failure: Mutex<Option<StatusCode>>,
    pub service_failure: Mutex<Option<StatusCode>>,
    pub event_failure: Mutex<Option<StatusCode>>,
    pub start_failure: Mutex<Option<StatusCode>>,
    pub stop_failure: Mutex<Option<StatusCode>>,
    pub reset_failure: Mutex<Option<StatusCode>>,

    pub calls: Mutex<Vec<&'static str>>,
    pub live_clients: AtomicUsize,
    pub live_buffers: AtomicUsize,
    pub live_signals: AtomicUsize,
    pub priority_raised: AtomicUsize,
    pub priority_restored: AtomicUsize,

    pub activated: Mutex<Option<(TargetProcess, Option<Duration>)>>,
    pub initialized_format: Mutex<Option<CaptureFormat>>,
    pub event: Mutex<Option<Arc<AutoResetEvent>>>,
}

impl MockShared {
    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Position of the first `call` in the log.
    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls.lock().iter().position(|c| *c == call)
    }

    pub fn live_resources(&self) -> usize {
        self.live_clients.load(Ordering::SeqCst)
            + self.live_buffers.load(Ordering::SeqCst)
            + self.live_signals.load(Ordering::SeqCst)
    }

    /// Queue `packets` and signal that samples are ready.
    pub fn deliver(&self, packets: Vec<Vec<u8>>) {
        self.packets.lock().extend(packets);
        self.fire();
    }

    pub fn fire(&self) {
        if let Some(event) = self.event.lock().as_ref() {
            event.fire();
        }
    }
}

fn check(slot: &Mutex<Option<StatusCode>>) -> Result<(), StatusCode> {
    match *slot.lock() {
        Some(code) => Err(code),
        None => Ok(()),
    }
}

pub(crate) struct MockSubsystem {
    pub shared: Arc<MockShared>,
}

impl MockSubsystem {
    pub fn new() -> (Self, Arc<MockShared>) {
        let shared = Arc::new(MockShared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            shared,
        )
    }
}

impl AudioSubsystem for MockSubsystem {
    type Client = MockClient;
    type PriorityGuard = MockPriorityGuard;

    fn activate(&self, target: &TargetProcess, timeout: Option<Duration>) -> Result<MockClient, ActivationError> {
        self.shared.record("activate");
        if let Some(error) = self.shared.activation_failure.lock().clone() {
            return Err(error);
        }
        *self.shared.activated.lock() = Some((*target, timeout));
        self.shared.live_clients.fetch_add(1, Ordering::SeqCst);
        Ok(MockClient {
            shared: Arc::clone(&self.shared),
        })
    }

    fn raise_thread_priority(&self) -> MockPriorityGuard {
        self.shared.record("raise_priority");
        self.shared.priority_raised.fetch_add(1, Ordering::SeqCst);
        MockPriorityGuard {
            shared: Arc::clone(&self.shared),
        }
    }
}

pub(crate) struct MockPriorityGuard {
    shared: Arc<MockShared>,
}

impl Drop for MockPriorityGuard {
    fn drop(&mut self) {
        self.shared.record("restore_priority");
        self.shared.priority_restored.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct MockClient {
    shared: Arc<MockShared>,
}

impl LoopbackClient for MockClient {
    type Buffer = MockBuffer;
    type Signal = MockSignal;

    fn initialize(&mut self, format: &CaptureFormat) -> Result<(), StatusCode> {
        self.shared.record("initialize");
        check(&self.shared.initialize_failure)?;
        *self.shared.initialized_format.lock() = Some(*format);
        Ok(())
    }

    fn capture_buffer(&mut self) -> Result<MockBuffer, StatusCode> {
        self.shared.record("capture_buffer");
        check(&self.shared.service_failure)?;
        self.shared.live_buffers.fetch_add(1, Ordering::SeqCst);
        Ok(MockBuffer {
            shared: Arc::clone(&self.shared),
        })
    }

    fn bind_sample_ready_event(&mut self) -> Result<MockSignal, StatusCode> {
        self.shared.record("bind_event");
        check(&self.shared.event_failure)?;
        let event = Arc::new(AutoResetEvent::default());
        *self.shared.event.lock() = Some(Arc::clone(&event));
        self.shared.live_signals.fetch_add(1, Ordering::SeqCst);
        Ok(MockSignal {
            event,
            shared: Arc::clone(&self.shared),
        })
    }

    fn start(&mut self) -> Result<(), StatusCode> {
        self.shared.record("start");
        check(&self.shared.start_failure)
    }

    fn stop(&mut self) -> Result<(), StatusCode> {
        self.shared.record("stop");
        check(&self.shared.stop_failure)
    }

    fn reset(&mut self) -> Result<(), StatusCode> {
        self.shared.record("reset");
        check(&self.shared.reset_failure)
    }
}

impl Drop for MockClient {
    fn drop(&mut self) {
        self.shared.record("release_client");
        self.shared.live_clients.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct MockBuffer {
    shared: Arc<MockShared>,
}

impl MockBuffer {
    /// A standalone buffer preloaded with `packets`.
    pub fn with_packets(packets: Vec<Vec<u8>>) -> Self {
        let shared = Arc::new(MockShared::default());
        shared.packets.lock().extend(packets);
        shared.live_buffers.fetch_add(1, Ordering::SeqCst);
        Self { shared }
    }

    pub fn fail_after_queue(&mut self, code: StatusCode) {
        *self.shared.read_failure.lock() = Some(code);
    }

    /// Fail the release of the `packet`-th packet (1-based).
    pub fn fail_release_after(&mut self, packet: usize, code: StatusCode) {
        *self.shared.release_failure.lock() = Some((packet, code));
    }
}

impl CaptureBuffer for MockBuffer {
    fn read_packet(&mut self, block_align: usize, sink: &mut dyn FnMut(&[u8])) -> Result<Option<u32>, StatusCode> {
        let packet = self.shared.packets.lock().pop_front();
        match packet {
            Some(packet) => {
                sink(&packet);
                let read = self.shared.packets_read.fetch_add(1, Ordering::SeqCst) + 1;
                let mut release_failure = self.shared.release_failure.lock();
                if let Some((at, code)) = *release_failure {
                    if at == read {
                        *release_failure = None;
                        return Err(code);
                    }
                }
                Ok(Some((packet.len() / block_align.max(1)) as u32))
            }
            None => match self.shared.read_failure.lock().take() {
                Some(code) => Err(code),
                None => Ok(None),
            },
        }
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        self.shared.record("release_buffer");
        self.shared.live_buffers.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct MockSignal {
    event: Arc<AutoResetEvent>,
    shared: Arc<MockShared>,
}

impl SampleReadySignal for MockSignal {
    fn wait(&self, timeout: Duration) -> bool {
        self.event.wait(timeout)
    }

    fn reset(&self) {
        self.event.clear();
    }
}

impl Drop for MockSignal {
    fn drop(&mut self) {
        self.shared.record("close_signal");
        self.shared.live_signals.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Poll `condition` every millisecond until it holds or two seconds pass.
pub(crate) fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// `len` bytes of a recognizable pattern, continuing from byte `offset`.
pub(crate) fn pattern(offset: usize, len: usize) -> Vec<u8> {
    (offset..offset + len).map(|i| (i % 251) as u8).collect()
}
