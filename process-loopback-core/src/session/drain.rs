use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::diagnostics::CaptureDiagnostics;
use crate::models::error::StatusCode;
use crate::processing::warmup::WarmupSkip;
use crate::traits::audio_subsystem::{AudioSubsystem, CaptureBuffer, LoopbackClient, SampleReadySignal};
use crate::traits::delivery::DeliveryCallback;

/// How long one wait on the sample-ready signal may block before the
/// running flag is re-checked.
pub const SIGNAL_WAIT: Duration = Duration::from_millis(50);

pub(crate) type BufferOf<S> = <<S as AudioSubsystem>::Client as LoopbackClient>::Buffer;
pub(crate) type SignalOf<S> = <<S as AudioSubsystem>::Client as LoopbackClient>::Signal;

/// Result of draining every packet currently queued on the device.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DrainPass {
    pub packets: u64,
    pub bytes_kept: u64,
    pub bytes_skipped: u64,
    pub error: Option<StatusCode>,
}

/// Read packets until the device reports none left, appending what survives
/// the warm-up window to `pending`. A read error ends the pass.
pub(crate) fn drain_available<B: CaptureBuffer + ?Sized>(
    buffer: &mut B,
    block_align: usize,
    skip: &mut WarmupSkip,
    pending: &mut Vec<u8>,
) -> DrainPass {
    let mut pass = DrainPass::default();
    loop {
        let before = pending.len();
        let mut skipped = 0usize;
        let read = buffer.read_packet(block_align, &mut |packet: &[u8]| {
            skipped += skip.apply(packet, pending);
        });
        pass.bytes_kept += (pending.len() - before) as u64;
        pass.bytes_skipped += skipped as u64;
        match read {
            Ok(Some(_frames)) => pass.packets += 1,
            Ok(None) => return pass,
            Err(code) => {
                pass.error = Some(code);
                return pass;
            }
        }
    }
}

/// Everything the drain thread owns or shares with the engine.
pub(crate) struct DrainLoop<S: AudioSubsystem> {
    pub subsystem: Arc<S>,
    pub buffer: Arc<Mutex<BufferOf<S>>>,
    pub signal: Arc<SignalOf<S>>,
    pub callback: Option<DeliveryCallback>,
    pub block_align: usize,
    pub callback_interval: u32,
    pub skip: WarmupSkip,
    pub running: Arc<AtomicBool>,
    pub diagnostics: Arc<Mutex<CaptureDiagnostics>>,
}

impl<S: AudioSubsystem> DrainLoop<S> {
    /// Body of the drain thread. Returns once `running` is cleared.
    ///
    /// Bytes from signaled iterations accumulate until `callback_interval`
    /// iterations have passed; whatever is still pending when the loop exits
    /// is delivered before returning.
    pub fn run(mut self) {
        let _priority = self.subsystem.raise_thread_priority();
        let interval = self.callback_interval.max(1);
        let mut pending = Vec::new();
        let mut iterations = 0u32;

        while self.running.load(Ordering::SeqCst) {
            if !self.signal.wait(SIGNAL_WAIT) {
                continue;
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let started = Instant::now();
            let pass = {
                let mut buffer = self.buffer.lock();
                drain_available(&mut *buffer, self.block_align, &mut self.skip, &mut pending)
            };
            if let Some(code) = pass.error {
                log::warn!("capture buffer read failed (status {:#010x})", code);
            }

            iterations += 1;
            let delivered = if iterations >= interval {
                iterations = 0;
                self.deliver(&mut pending)
            } else {
                0
            };

            let elapsed = started.elapsed();
            let mut diagnostics = self.diagnostics.lock();
            diagnostics.drain_iterations += 1;
            diagnostics.packets_read += pass.packets;
            diagnostics.bytes_skipped += pass.bytes_skipped;
            if let Some(code) = pass.error {
                diagnostics.read_errors += 1;
                diagnostics.last_status = Some(code);
            }
            if delivered > 0 {
                diagnostics.callbacks_delivered += 1;
                diagnostics.bytes_delivered += delivered as u64;
            }
            diagnostics.record_execution_time(elapsed);
        }

        let delivered = self.deliver(&mut pending);
        if delivered > 0 {
            log::debug!("flushed {} pending bytes on drain exit", delivered);
            let mut diagnostics = self.diagnostics.lock();
            diagnostics.callbacks_delivered += 1;
            diagnostics.bytes_delivered += delivered as u64;
        }
    }

    /// Hand `pending` to the callback and clear it. Returns the bytes delivered;
    /// without a callback the batch is dropped.
    fn deliver(&self, pending: &mut Vec<u8>) -> usize {
        if pending.is_empty() {
            return 0;
        }
        let delivered = match self.callback {
            Some(ref callback) => {
                callback(pending);
                pending.len()
            }
            None => 0,
        };
        pending.clear();
        delivered
    }
}
