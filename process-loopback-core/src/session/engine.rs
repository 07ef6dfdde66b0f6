use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::drain::{BufferOf, DrainLoop, SignalOf};
use crate::models::config::{CaptureConfiguration, DEFAULT_ACTIVATION_TIMEOUT, DEFAULT_WARMUP};
use crate::models::diagnostics::CaptureDiagnostics;
use crate::models::error::{CaptureError, StatusCode};
use crate::models::format::{CaptureFormat, SampleEncoding};
use crate::models::state::{CaptureState, Transition};
use crate::models::target::{LoopbackMode, TargetProcess};
use crate::processing::warmup::WarmupSkip;
use crate::traits::audio_subsystem::{AudioSubsystem, LoopbackClient, SampleReadySignal};
use crate::traits::delivery::DeliveryCallback;

/// OS resources held between a successful start and the matching stop.
struct ActiveSession<S: AudioSubsystem> {
    client: S::Client,
    buffer: Arc<Mutex<BufferOf<S>>>,
    signal: Arc<SignalOf<S>>,
}

/// Per-process loopback capture engine.
///
/// Generic over the platform audio stack via [`AudioSubsystem`]. Owns the
/// session lifecycle and a single drain thread that pulls packets off the
/// device whenever the sample-ready signal fires:
/// ```text
/// [target process render streams]
///        → [loopback client] → sample-ready signal
///        → [drain thread: read packets → warm-up skip → accumulate]
///        → [delivery callback]
/// ```
///
/// All lifecycle calls take `&mut self`; wrap the engine in a mutex to drive
/// it from more than one thread.
pub struct CaptureEngine<S: AudioSubsystem> {
    subsystem: Arc<S>,
    state: CaptureState,
    format: Option<CaptureFormat>,
    target: Option<TargetProcess>,
    callback: Option<DeliveryCallback>,
    callback_interval: u32,
    warmup: Duration,
    activation_timeout: Option<Duration>,

    session: Option<ActiveSession<S>>,
    running: Arc<AtomicBool>,
    drain_handle: Option<thread::JoinHandle<()>>,
    diagnostics: Arc<Mutex<CaptureDiagnostics>>,
}

impl<S: AudioSubsystem> CaptureEngine<S> {
    pub fn new(subsystem: S) -> Self {
        Self::with_shared_subsystem(Arc::new(subsystem))
    }

    pub fn with_shared_subsystem(subsystem: Arc<S>) -> Self {
        Self {
            subsystem,
            state: CaptureState::Ready,
            format: None,
            target: None,
            callback: None,
            callback_interval: 1,
            warmup: DEFAULT_WARMUP,
            activation_timeout: Some(DEFAULT_ACTIVATION_TIMEOUT),
            session: None,
            running: Arc::new(AtomicBool::new(false)),
            drain_handle: None,
            diagnostics: Arc::new(Mutex::new(CaptureDiagnostics::default())),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn target(&self) -> Option<TargetProcess> {
        self.target
    }

    /// True while a drain thread is alive.
    pub fn is_draining(&self) -> bool {
        self.drain_handle.is_some()
    }

    // --- Configuration (ready state only) ---

    /// Apply a whole configuration at once. Nothing is changed if it is invalid.
    pub fn configure(&mut self, config: &CaptureConfiguration) -> Result<(), CaptureError> {
        self.state.ensure_configurable()?;
        let format = config.format()?;
        let target = config.target()?;

        self.format = Some(format);
        self.target = Some(target);
        self.callback_interval = config.callback_interval.max(1);
        self.warmup = config.warmup;
        self.activation_timeout = config.activation_timeout;
        log::info!(
            "configured capture of pid {} ({:?}): {} Hz, {}-bit, {} ch",
            target.process_id(),
            target.mode(),
            format.sample_rate(),
            format.bit_depth(),
            format.channels()
        );
        Ok(())
    }

    /// Set an integer PCM capture format.
    pub fn set_format(&mut self, sample_rate: u32, bit_depth: u16, channels: u16) -> Result<(), CaptureError> {
        self.set_format_with_encoding(SampleEncoding::Pcm, sample_rate, bit_depth, channels)
    }

    pub fn set_format_with_encoding(
        &mut self,
        encoding: SampleEncoding,
        sample_rate: u32,
        bit_depth: u16,
        channels: u16,
    ) -> Result<(), CaptureError> {
        self.state.ensure_configurable()?;
        self.format = Some(CaptureFormat::with_encoding(encoding, sample_rate, bit_depth, channels)?);
        Ok(())
    }

    /// The configured format, or `NotInitialized` if none was set.
    pub fn copy_format(&self) -> Result<CaptureFormat, CaptureError> {
        self.format.ok_or(CaptureError::NotInitialized)
    }

    pub fn set_target_process(&mut self, process_id: u32, mode: LoopbackMode) -> Result<(), CaptureError> {
        self.state.ensure_configurable()?;
        self.target = Some(TargetProcess::new(process_id, mode)?);
        Ok(())
    }

    pub fn set_callback<F>(&mut self, callback: F) -> Result<(), CaptureError>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.set_delivery_callback(Arc::new(callback))
    }

    pub fn set_delivery_callback(&mut self, callback: DeliveryCallback) -> Result<(), CaptureError> {
        self.state.ensure_configurable()?;
        self.callback = Some(callback);
        Ok(())
    }

    /// Deliver once every `interval` signaled drain iterations. Zero counts as one.
    pub fn set_callback_interval(&mut self, interval: u32) -> Result<(), CaptureError> {
        self.state.ensure_configurable()?;
        self.callback_interval = interval.max(1);
        Ok(())
    }

    pub fn callback_interval(&self) -> u32 {
        self.callback_interval
    }

    /// Warm-up window used by [`resume_capture`](Self::resume_capture).
    pub fn set_warmup(&mut self, warmup: Duration) -> Result<(), CaptureError> {
        self.state.ensure_configurable()?;
        self.warmup = warmup;
        Ok(())
    }

    /// Bound on the activation handshake; `None` waits indefinitely.
    pub fn set_activation_timeout(&mut self, timeout: Option<Duration>) -> Result<(), CaptureError> {
        self.state.ensure_configurable()?;
        self.activation_timeout = timeout;
        Ok(())
    }

    // --- Lifecycle ---

    /// Activate, initialize and start a loopback session for the target
    /// process, then start draining. Transitions: ready → capturing.
    ///
    /// On any failure every resource acquired so far is released and the
    /// engine stays ready.
    pub fn start_capture(&mut self) -> Result<(), CaptureError> {
        let next = self.state.next(Transition::Start)?;
        let format = self.format.ok_or(CaptureError::FormatNotSet)?;
        let target = self.target.ok_or(CaptureError::ProcessNotSet)?;

        *self.diagnostics.lock() = CaptureDiagnostics::default();

        let mut session = self.open_session(&format, &target).map_err(|e| self.fail(e))?;
        if let Err(code) = session.client.start() {
            self.release_session(session, false);
            return Err(self.fail(CaptureError::SessionStartFailed(code)));
        }

        self.session = Some(session);
        if let Err(e) = self.spawn_drain(WarmupSkip::none()) {
            if let Some(session) = self.session.take() {
                self.release_session(session, true);
            }
            return Err(self.fail(e));
        }

        log::info!("capturing pid {} ({:?})", target.process_id(), target.mode());
        self.set_state(next);
        Ok(())
    }

    /// Stop the stream and the drain thread, keeping the session for a
    /// resume. Transitions: capturing → paused.
    pub fn pause_capture(&mut self) -> Result<(), CaptureError> {
        let next = self.state.next(Transition::Pause)?;
        let session = self.session.as_mut().ok_or(CaptureError::InvalidState(self.state.name()))?;

        if let Err(code) = session.client.stop() {
            return Err(self.fail(CaptureError::SessionStopFailed(code)));
        }
        self.join_drain();
        log::info!("capture paused");
        self.set_state(next);
        Ok(())
    }

    /// Resume with the configured warm-up window. Transitions: paused → capturing.
    pub fn resume_capture(&mut self) -> Result<(), CaptureError> {
        self.resume_capture_with_warmup(self.warmup)
    }

    /// Restart the stream and discard the first `warmup` of audio it produces.
    pub fn resume_capture_with_warmup(&mut self, warmup: Duration) -> Result<(), CaptureError> {
        let next = self.state.next(Transition::Resume)?;
        let format = self.format.ok_or(CaptureError::FormatNotSet)?;
        let session = self.session.as_mut().ok_or(CaptureError::InvalidState(self.state.name()))?;

        session.signal.reset();
        if let Err(code) = session.client.start() {
            return Err(self.fail(CaptureError::SessionStartFailed(code)));
        }

        let skip = WarmupSkip::new(format.bytes_for_duration(warmup.as_secs_f64()));
        if let Err(e) = self.spawn_drain(skip) {
            if let Some(session) = self.session.as_mut() {
                if let Err(code) = session.client.stop() {
                    log::warn!("failed to stop stream after drain spawn failure (status {:#010x})", code);
                }
            }
            return Err(self.fail(e));
        }

        log::info!("capture resumed, skipping {} warm-up bytes", skip.remaining());
        self.set_state(next);
        Ok(())
    }

    /// Tear the session down. Transitions: capturing/paused → ready.
    ///
    /// Teardown is best-effort: failing OS calls are logged and recorded as
    /// the last status, and the engine always ends up ready.
    pub fn stop_capture(&mut self) -> Result<(), CaptureError> {
        self.state.next(Transition::Stop)?;
        self.teardown();
        log::info!("capture stopped");
        Ok(())
    }

    // --- Diagnostics ---

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        *self.diagnostics.lock()
    }

    /// Longest single drain iteration observed since the last reset.
    pub fn max_execution_time(&self) -> Duration {
        self.diagnostics.lock().max_execution_time
    }

    pub fn reset_max_execution_time(&self) {
        self.diagnostics.lock().max_execution_time = Duration::ZERO;
    }

    /// Most recent failing status reported by an audio call, if any.
    pub fn last_status(&self) -> Option<StatusCode> {
        self.diagnostics.lock().last_status
    }

    // --- Internal helpers ---

    fn open_session(&self, format: &CaptureFormat, target: &TargetProcess) -> Result<ActiveSession<S>, CaptureError> {
        let mut client = self
            .subsystem
            .activate(target, self.activation_timeout)
            .map_err(CaptureError::DeviceActivationFailed)?;

        if let Err(code) = client.initialize(format) {
            discard_client(client);
            return Err(CaptureError::SessionInitFailed(code));
        }

        let buffer = match client.capture_buffer() {
            Ok(buffer) => buffer,
            Err(code) => {
                discard_client(client);
                return Err(CaptureError::ServiceUnavailable(code));
            }
        };

        let signal = match client.bind_sample_ready_event() {
            Ok(signal) => signal,
            Err(code) => {
                drop(buffer);
                discard_client(client);
                return Err(CaptureError::EventSetupFailed(code));
            }
        };

        Ok(ActiveSession {
            client,
            buffer: Arc::new(Mutex::new(buffer)),
            signal: Arc::new(signal),
        })
    }

    /// Release a session in order: stream, buffer access, session handle, signal.
    ///
    /// The drain thread must already be joined so the shared handles are
    /// released here rather than on the drain thread.
    fn release_session(&self, session: ActiveSession<S>, stream_running: bool) {
        let ActiveSession {
            mut client,
            buffer,
            signal,
        } = session;

        if stream_running {
            if let Err(code) = client.stop() {
                log::warn!("failed to stop audio stream (status {:#010x})", code);
                self.record_status(code);
            }
        }
        drop(buffer);
        if let Err(code) = client.reset() {
            log::warn!("failed to reset audio client (status {:#010x})", code);
            self.record_status(code);
        }
        drop(client);
        drop(signal);
    }

    fn teardown(&mut self) {
        self.join_drain();
        let stream_running = self.state.is_capturing();
        if let Some(session) = self.session.take() {
            self.release_session(session, stream_running);
        }
        self.set_state(CaptureState::Ready);
    }

    fn spawn_drain(&mut self, skip: WarmupSkip) -> Result<(), CaptureError> {
        let (format, session) = match (self.format, self.session.as_ref()) {
            (Some(format), Some(session)) => (format, session),
            _ => return Err(CaptureError::NotInitialized),
        };

        let drain = DrainLoop {
            subsystem: Arc::clone(&self.subsystem),
            buffer: Arc::clone(&session.buffer),
            signal: Arc::clone(&session.signal),
            callback: self.callback.clone(),
            block_align: format.block_align() as usize,
            callback_interval: self.callback_interval,
            skip,
            running: Arc::clone(&self.running),
            diagnostics: Arc::clone(&self.diagnostics),
        };

        self.running.store(true, Ordering::SeqCst);
        match thread::Builder::new()
            .name("loopback-drain".into())
            .spawn(move || drain.run())
        {
            Ok(handle) => {
                self.drain_handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(CaptureError::ThreadSpawnFailed(e.to_string()))
            }
        }
    }

    fn join_drain(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.drain_handle.take() {
            if handle.join().is_err() {
                log::error!("drain thread panicked");
            }
        }
    }

    fn fail(&self, error: CaptureError) -> CaptureError {
        if let Some(code) = error.status_code() {
            self.record_status(code);
        }
        log::error!("{}", error);
        error
    }

    fn record_status(&self, code: StatusCode) {
        self.diagnostics.lock().last_status = Some(code);
    }

    fn set_state(&mut self, new_state: CaptureState) {
        if self.state != new_state {
            log::debug!("capture state {} -> {}", self.state, new_state);
        }
        self.state = new_state;
    }
}

impl<S: AudioSubsystem> Drop for CaptureEngine<S> {
    fn drop(&mut self) {
        if !self.state.is_ready() || self.drain_handle.is_some() || self.session.is_some() {
            self.teardown();
        }
    }
}

/// Roll back a client that never made it into a session.
fn discard_client<C: LoopbackClient>(mut client: C) {
    if let Err(code) = client.reset() {
        log::debug!("reset during rollback failed (status {:#010x})", code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::error::ActivationError;
    use crate::testing::{pattern, wait_for, MockShared, MockSubsystem};
    use std::sync::atomic::Ordering;
    use std::sync::mpsc;

    const RECV: Duration = Duration::from_secs(2);
    const QUIET: Duration = Duration::from_millis(150);

    fn engine() -> (CaptureEngine<MockSubsystem>, Arc<MockShared>) {
        let (subsystem, shared) = MockSubsystem::new();
        (CaptureEngine::new(subsystem), shared)
    }

    /// Engine configured for 44.1 kHz 16-bit stereo, delivering into a channel.
    fn configured() -> (CaptureEngine<MockSubsystem>, Arc<MockShared>, mpsc::Receiver<Vec<u8>>) {
        let (mut engine, shared) = engine();
        engine.set_format(44100, 16, 2).unwrap();
        engine.set_target_process(1234, LoopbackMode::IncludeTree).unwrap();
        let (tx, rx) = mpsc::channel();
        engine
            .set_callback(move |bytes| {
                let _ = tx.send(bytes.to_vec());
            })
            .unwrap();
        (engine, shared, rx)
    }

    fn wait_iterations(engine: &CaptureEngine<MockSubsystem>, n: u64) {
        assert!(wait_for(|| engine.diagnostics().drain_iterations >= n));
    }

    #[test]
    fn start_requires_format_then_process() {
        let (mut engine, shared) = engine();
        assert_eq!(engine.start_capture(), Err(CaptureError::FormatNotSet));

        engine.set_format(48000, 16, 2).unwrap();
        assert_eq!(engine.start_capture(), Err(CaptureError::ProcessNotSet));
        assert!(shared.calls().is_empty());
        assert_eq!(engine.state(), CaptureState::Ready);
    }

    #[test]
    fn copy_format_before_set_is_not_initialized() {
        let (mut engine, _) = engine();
        assert_eq!(engine.copy_format(), Err(CaptureError::NotInitialized));
        engine.set_format(44100, 16, 2).unwrap();
        assert_eq!(engine.copy_format().unwrap().block_align(), 4);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let (mut engine, _) = engine();
        assert!(matches!(engine.set_format(44100, 12, 2), Err(CaptureError::InvalidParameter(_))));
        assert!(matches!(
            engine.set_target_process(0, LoopbackMode::IncludeTree),
            Err(CaptureError::InvalidParameter(_))
        ));
        assert_eq!(engine.copy_format(), Err(CaptureError::NotInitialized));
        assert_eq!(engine.target(), None);
    }

    #[test]
    fn start_activates_the_target_with_the_configured_format() {
        let (mut engine, shared, _rx) = configured();
        engine.set_activation_timeout(Some(Duration::from_secs(1))).unwrap();
        engine.start_capture().unwrap();

        assert_eq!(engine.state(), CaptureState::Capturing);
        assert!(engine.is_draining());
        let (target, timeout) = shared.activated.lock().unwrap();
        assert_eq!(target.process_id(), 1234);
        assert!(target.is_inclusive());
        assert_eq!(timeout, Some(Duration::from_secs(1)));
        assert_eq!(*shared.initialized_format.lock(), Some(CaptureFormat::new(44100, 16, 2).unwrap()));
        assert_eq!(
            &shared.calls()[..5],
            &["activate", "initialize", "capture_buffer", "bind_event", "start"]
        );

        engine.stop_capture().unwrap();
    }

    #[test]
    fn two_packets_in_one_iteration_arrive_as_one_batch() {
        let (mut engine, shared, rx) = configured();
        engine.start_capture().unwrap();

        shared.deliver(vec![pattern(0, 100 * 4), pattern(400, 50 * 4)]);

        let batch = rx.recv_timeout(RECV).unwrap();
        assert_eq!(batch.len(), 600);
        assert_eq!(batch, pattern(0, 600));
        assert!(rx.recv_timeout(QUIET).is_err());

        engine.stop_capture().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn resume_discards_the_warmup_window() {
        let (mut engine, shared, rx) = configured();
        engine.start_capture().unwrap();
        engine.pause_capture().unwrap();
        assert_eq!(engine.state(), CaptureState::Paused);
        assert!(!engine.is_draining());

        engine.resume_capture().unwrap();
        assert_eq!(engine.state(), CaptureState::Capturing);

        // 100 ms at 44.1 kHz stereo 16-bit: 4410 frames, 17640 bytes.
        let total = 5000 * 4;
        shared.deliver(vec![pattern(0, 8000), pattern(8000, total - 8000)]);

        let batch = rx.recv_timeout(RECV).unwrap();
        assert_eq!(batch.len(), total - 17_640);
        assert_eq!(batch, pattern(17_640, total - 17_640));
        wait_iterations(&engine, 1);
        assert_eq!(engine.diagnostics().bytes_skipped, 17_640);

        engine.stop_capture().unwrap();
    }

    #[test]
    fn explicit_warmup_overrides_default() {
        let (mut engine, shared, rx) = configured();
        engine.start_capture().unwrap();
        engine.pause_capture().unwrap();
        engine.resume_capture_with_warmup(Duration::ZERO).unwrap();

        shared.deliver(vec![pattern(0, 40)]);
        assert_eq!(rx.recv_timeout(RECV).unwrap(), pattern(0, 40));

        engine.stop_capture().unwrap();
    }

    #[test]
    fn unbounded_warmup_discards_everything() {
        let (mut engine, shared, rx) = configured();
        engine.start_capture().unwrap();
        engine.pause_capture().unwrap();
        engine.resume_capture_with_warmup(Duration::MAX).unwrap();

        shared.deliver(vec![pattern(0, 64)]);
        wait_iterations(&engine, 1);
        assert!(rx.recv_timeout(QUIET).is_err());
        assert_eq!(engine.diagnostics().bytes_skipped, 64);

        engine.stop_capture().unwrap();
    }

    #[test]
    fn first_start_skips_nothing() {
        let (mut engine, shared, rx) = configured();
        engine.set_warmup(Duration::from_secs(1)).unwrap();
        engine.start_capture().unwrap();

        shared.deliver(vec![pattern(0, 16)]);
        assert_eq!(rx.recv_timeout(RECV).unwrap().len(), 16);

        engine.stop_capture().unwrap();
    }

    #[test]
    fn interval_batches_several_iterations() {
        let (mut engine, shared, rx) = configured();
        engine.set_callback_interval(3).unwrap();
        engine.start_capture().unwrap();

        shared.deliver(vec![pattern(0, 8)]);
        wait_iterations(&engine, 1);
        shared.deliver(vec![pattern(8, 8)]);
        wait_iterations(&engine, 2);
        assert!(rx.try_recv().is_err());

        shared.deliver(vec![pattern(16, 8)]);
        assert_eq!(rx.recv_timeout(RECV).unwrap(), pattern(0, 24));

        engine.stop_capture().unwrap();
    }

    #[test]
    fn zero_interval_counts_as_one() {
        let (mut engine, _, _rx) = configured();
        engine.set_callback_interval(0).unwrap();
        assert_eq!(engine.callback_interval(), 1);
    }

    #[test]
    fn pending_bytes_are_flushed_when_draining_stops() {
        let (mut engine, shared, rx) = configured();
        engine.set_callback_interval(10).unwrap();
        engine.start_capture().unwrap();

        shared.deliver(vec![pattern(0, 12)]);
        wait_iterations(&engine, 1);
        assert!(rx.try_recv().is_err());

        engine.pause_capture().unwrap();
        assert_eq!(rx.try_recv().unwrap(), pattern(0, 12));

        engine.stop_capture().unwrap();
    }

    #[test]
    fn capture_without_callback_discards_audio() {
        let (mut engine, shared) = engine();
        engine.set_format(48000, 16, 2).unwrap();
        engine.set_target_process(99, LoopbackMode::ExcludeTree).unwrap();
        engine.start_capture().unwrap();

        shared.deliver(vec![pattern(0, 64)]);
        wait_iterations(&engine, 1);
        assert!(shared.packets.lock().is_empty());
        assert_eq!(engine.diagnostics().bytes_delivered, 0);

        engine.stop_capture().unwrap();
    }

    #[test]
    fn activation_failure_rolls_back() {
        let (mut engine, shared, _rx) = configured();
        *shared.activation_failure.lock() = Some(ActivationError::Rejected(0x8007_0005_u32 as i32));

        let err = engine.start_capture().unwrap_err();
        assert!(err.is_rejected_activation());
        assert_eq!(engine.state(), CaptureState::Ready);
        assert!(!engine.is_draining());
        assert_eq!(engine.last_status(), Some(0x8007_0005_u32 as i32));
        assert_eq!(shared.live_resources(), 0);
        assert_eq!(shared.priority_raised.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn activation_timeout_is_reported_without_status() {
        let (mut engine, shared, _rx) = configured();
        *shared.activation_failure.lock() = Some(ActivationError::TimedOut(Duration::from_secs(5)));

        assert_eq!(
            engine.start_capture(),
            Err(CaptureError::DeviceActivationFailed(ActivationError::TimedOut(Duration::from_secs(5))))
        );
        assert_eq!(engine.last_status(), None);
        assert_eq!(engine.state(), CaptureState::Ready);
    }

    #[test]
    fn each_setup_failure_rolls_back_and_allows_retry() {
        type Slot = fn(&MockShared) -> &Mutex<Option<StatusCode>>;
        let cases: [(Slot, fn(StatusCode) -> CaptureError); 4] = [
            (|s| &s.initialize_failure, CaptureError::SessionInitFailed),
            (|s| &s.service_failure, CaptureError::ServiceUnavailable),
            (|s| &s.event_failure, CaptureError::EventSetupFailed),
            (|s| &s.start_failure, CaptureError::SessionStartFailed),
        ];

        for (slot, expected) in cases {
            let (mut engine, shared, _rx) = configured();
            *slot(&shared).lock() = Some(-100);

            assert_eq!(engine.start_capture(), Err(expected(-100)));
            assert_eq!(engine.state(), CaptureState::Ready);
            assert!(!engine.is_draining());
            assert_eq!(engine.last_status(), Some(-100));
            assert_eq!(shared.live_resources(), 0);
            assert!(shared.position("reset").is_some());

            *slot(&shared).lock() = None;
            engine.start_capture().unwrap();
            assert_eq!(engine.state(), CaptureState::Capturing);
            engine.stop_capture().unwrap();
            assert_eq!(shared.live_resources(), 0);
        }
    }

    #[test]
    fn out_of_order_transitions_are_rejected() {
        let (mut engine, _, _rx) = configured();
        assert_eq!(engine.pause_capture(), Err(CaptureError::InvalidState("ready")));
        assert_eq!(engine.resume_capture(), Err(CaptureError::InvalidState("ready")));
        assert_eq!(engine.stop_capture(), Err(CaptureError::InvalidState("ready")));

        engine.start_capture().unwrap();
        assert_eq!(engine.start_capture(), Err(CaptureError::InvalidState("capturing")));
        assert_eq!(engine.resume_capture(), Err(CaptureError::InvalidState("capturing")));

        engine.pause_capture().unwrap();
        assert_eq!(engine.pause_capture(), Err(CaptureError::InvalidState("paused")));
        assert_eq!(engine.start_capture(), Err(CaptureError::InvalidState("paused")));

        engine.stop_capture().unwrap();
        assert_eq!(engine.state(), CaptureState::Ready);
    }

    #[test]
    fn setters_are_rejected_outside_ready() {
        let (mut engine, _, _rx) = configured();
        engine.start_capture().unwrap();

        for state in ["capturing", "paused"] {
            assert_eq!(engine.set_format(48000, 16, 2), Err(CaptureError::InvalidState(state)));
            assert_eq!(
                engine.set_target_process(1, LoopbackMode::ExcludeTree),
                Err(CaptureError::InvalidState(state))
            );
            assert_eq!(engine.set_callback(|_| {}), Err(CaptureError::InvalidState(state)));
            assert_eq!(engine.set_callback_interval(2), Err(CaptureError::InvalidState(state)));
            assert_eq!(engine.set_warmup(Duration::ZERO), Err(CaptureError::InvalidState(state)));
            assert_eq!(engine.set_activation_timeout(None), Err(CaptureError::InvalidState(state)));
            if state == "capturing" {
                engine.pause_capture().unwrap();
            }
        }

        engine.stop_capture().unwrap();
        assert!(engine.set_format(48000, 16, 2).is_ok());
    }

    #[test]
    fn stop_joins_drain_before_releasing_buffer() {
        let (mut engine, shared, _rx) = configured();
        engine.start_capture().unwrap();
        assert!(wait_for(|| shared.priority_raised.load(Ordering::SeqCst) == 1));
        engine.stop_capture().unwrap();

        let restore = shared.position("restore_priority").unwrap();
        let stop = shared.position("stop").unwrap();
        let release_buffer = shared.position("release_buffer").unwrap();
        let reset = shared.position("reset").unwrap();
        let release_client = shared.position("release_client").unwrap();
        let close_signal = shared.position("close_signal").unwrap();
        assert!(restore < release_buffer);
        assert!(stop < release_buffer);
        assert!(release_buffer < reset);
        assert!(reset < release_client);
        assert!(release_client < close_signal);
        assert_eq!(shared.live_resources(), 0);
    }

    #[test]
    fn stop_from_paused_does_not_stop_stream_twice() {
        let (mut engine, shared, _rx) = configured();
        engine.start_capture().unwrap();
        engine.pause_capture().unwrap();
        shared.clear_calls();

        engine.stop_capture().unwrap();
        assert_eq!(shared.position("stop"), None);
        assert!(shared.position("reset").is_some());
        assert_eq!(shared.live_resources(), 0);
    }

    #[test]
    fn priority_is_raised_once_per_drain_thread() {
        let (mut engine, shared, _rx) = configured();
        engine.start_capture().unwrap();
        engine.pause_capture().unwrap();
        engine.resume_capture().unwrap();
        engine.stop_capture().unwrap();

        assert_eq!(shared.priority_raised.load(Ordering::SeqCst), 2);
        assert_eq!(shared.priority_restored.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn pause_failure_keeps_capturing() {
        let (mut engine, shared, _rx) = configured();
        engine.start_capture().unwrap();
        *shared.stop_failure.lock() = Some(-3);

        assert_eq!(engine.pause_capture(), Err(CaptureError::SessionStopFailed(-3)));
        assert_eq!(engine.state(), CaptureState::Capturing);
        assert!(engine.is_draining());
        assert_eq!(engine.last_status(), Some(-3));

        *shared.stop_failure.lock() = None;
        engine.stop_capture().unwrap();
    }

    #[test]
    fn resume_failure_stays_paused() {
        let (mut engine, shared, _rx) = configured();
        engine.start_capture().unwrap();
        engine.pause_capture().unwrap();
        *shared.start_failure.lock() = Some(-4);

        assert_eq!(engine.resume_capture(), Err(CaptureError::SessionStartFailed(-4)));
        assert_eq!(engine.state(), CaptureState::Paused);
        assert!(!engine.is_draining());

        *shared.start_failure.lock() = None;
        engine.resume_capture().unwrap();
        assert_eq!(engine.state(), CaptureState::Capturing);
        engine.stop_capture().unwrap();
    }

    #[test]
    fn teardown_failures_are_recorded_but_stop_succeeds() {
        let (mut engine, shared, _rx) = configured();
        engine.start_capture().unwrap();
        *shared.stop_failure.lock() = Some(-5);
        *shared.reset_failure.lock() = Some(-6);

        assert_eq!(engine.stop_capture(), Ok(()));
        assert_eq!(engine.state(), CaptureState::Ready);
        assert_eq!(engine.last_status(), Some(-6));
        assert_eq!(shared.live_resources(), 0);
    }

    #[test]
    fn read_errors_are_recorded_and_draining_continues() {
        let (mut engine, shared, rx) = configured();
        engine.start_capture().unwrap();

        *shared.read_failure.lock() = Some(-7);
        shared.deliver(vec![pattern(0, 8)]);
        assert_eq!(rx.recv_timeout(RECV).unwrap(), pattern(0, 8));
        wait_iterations(&engine, 1);
        assert_eq!(engine.last_status(), Some(-7));
        assert_eq!(engine.diagnostics().read_errors, 1);

        shared.deliver(vec![pattern(8, 8)]);
        assert_eq!(rx.recv_timeout(RECV).unwrap(), pattern(8, 8));

        engine.stop_capture().unwrap();
    }

    #[test]
    fn max_execution_time_tracks_slow_callbacks() {
        let (mut engine, shared) = engine();
        engine.set_format(44100, 16, 2).unwrap();
        engine.set_target_process(7, LoopbackMode::IncludeTree).unwrap();
        engine
            .set_callback(|_| std::thread::sleep(Duration::from_millis(30)))
            .unwrap();
        engine.start_capture().unwrap();

        shared.deliver(vec![pattern(0, 4)]);
        wait_iterations(&engine, 1);
        assert!(engine.max_execution_time() >= Duration::from_millis(30));

        engine.reset_max_execution_time();
        assert_eq!(engine.max_execution_time(), Duration::ZERO);

        engine.stop_capture().unwrap();
    }

    #[test]
    fn engine_restarts_after_stop() {
        let (mut engine, shared, rx) = configured();
        for round in 0..3 {
            engine.start_capture().unwrap();
            shared.deliver(vec![pattern(round * 4, 4)]);
            assert_eq!(rx.recv_timeout(RECV).unwrap(), pattern(round * 4, 4));
            engine.stop_capture().unwrap();
        }
        assert_eq!(shared.live_resources(), 0);
    }

    #[test]
    fn configure_applies_everything_or_nothing() {
        let (mut engine, _) = engine();
        let bad = CaptureConfiguration {
            bit_depth: 7,
            process_id: 1,
            ..Default::default()
        };
        assert!(engine.configure(&bad).is_err());
        assert_eq!(engine.copy_format(), Err(CaptureError::NotInitialized));

        let good = CaptureConfiguration {
            process_id: 55,
            callback_interval: 0,
            activation_timeout: None,
            ..Default::default()
        };
        engine.configure(&good).unwrap();
        assert_eq!(engine.target().unwrap().process_id(), 55);
        assert_eq!(engine.callback_interval(), 1);
        assert_eq!(engine.copy_format().unwrap().sample_rate(), 48000);
    }

    #[test]
    fn dropping_a_capturing_engine_releases_everything() {
        let (mut engine, shared, _rx) = configured();
        engine.start_capture().unwrap();
        drop(engine);

        assert_eq!(shared.live_resources(), 0);
        assert_eq!(shared.priority_restored.load(Ordering::SeqCst), 1);
    }
}
