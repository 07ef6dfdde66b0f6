use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use process_loopback_core::{CaptureConfiguration, CaptureError, LoopbackMode, SampleEncoding};

#[derive(Parser, Debug)]
#[command(name = "process-loopback")]
#[command(about = "Record the audio rendered by one process tree to a WAV file")]
#[command(after_help = "\
Examples:

  process-loopback 1234 includetree CapturedAudio.wav
      Captures audio from process 1234 and its children.

  process-loopback 1234 excludetree CapturedAudio.wav
      Captures audio from all processes except process 1234 and its children.")]
struct Args {
    /// Process ID to capture, or to exclude from capture
    process_id: u32,

    /// includetree: that process and its children; excludetree: everything else
    mode: LoopbackMode,

    /// WAV file to receive the captured audio
    output: PathBuf,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 44100)]
    sample_rate: u32,

    /// Bits per sample (default 16, or 32 with --float)
    #[arg(long)]
    bit_depth: Option<u16>,

    #[arg(long, default_value_t = 2)]
    channels: u16,

    /// Capture 32-bit IEEE float samples instead of integer PCM
    #[arg(long)]
    float: bool,

    /// Seconds to record; 0 records until Ctrl+C
    #[arg(long, default_value_t = 10.0)]
    duration: f64,

    /// Also write a <output>.metadata.json sidecar
    #[arg(long)]
    metadata: bool,
}

impl Args {
    fn configuration(&self) -> CaptureConfiguration {
        let encoding = if self.float {
            SampleEncoding::IeeeFloat
        } else {
            SampleEncoding::Pcm
        };
        CaptureConfiguration {
            sample_rate: self.sample_rate,
            bit_depth: self.bit_depth.unwrap_or(if self.float { 32 } else { 16 }),
            channels: self.channels,
            encoding,
            process_id: self.process_id,
            mode: self.mode,
            ..Default::default()
        }
    }

    /// `None` records until interrupted.
    fn capture_duration(&self) -> Result<Option<Duration>> {
        if self.duration == 0.0 {
            return Ok(None);
        }
        Duration::try_from_secs_f64(self.duration)
            .map(Some)
            .map_err(|_| anyhow::anyhow!("invalid --duration {}", self.duration))
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        match e.downcast_ref::<CaptureError>().and_then(CaptureError::status_code) {
            Some(code) => eprintln!("Failed to capture\n{:#010x}: {:#}", code, e),
            None => eprintln!("Failed to capture\n{:#}", e),
        }
        std::process::exit(1);
    }
}

#[cfg(target_os = "windows")]
fn run(args: &Args) -> Result<()> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    use anyhow::Context;
    use process_loopback_core::storage::metadata::write_metadata;
    use process_loopback_core::{CaptureEngine, RecordingMetadata, WavSink};
    use process_loopback_windows::{ComGuard, WasapiSubsystem};

    let config = args.configuration();
    config.validate()?;
    let format = config.format()?;
    let target = config.target()?;
    let duration = args.capture_duration()?;

    let _com = ComGuard::initialize_mta();

    let sink = WavSink::create(&args.output, format)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let mut engine = CaptureEngine::new(WasapiSubsystem::new());
    engine.configure(&config)?;
    engine.set_delivery_callback(sink.callback())?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived Ctrl+C, stopping capture...");
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    if let Err(e) = engine.start_capture() {
        sink.finish().ok();
        std::fs::remove_file(&args.output).ok();
        return Err(e.into());
    }

    println!("Capturing pid {} ({:?})", target.process_id(), target.mode());
    match duration {
        Some(d) => println!("Capturing {:.1} seconds of audio. Press Ctrl+C to stop early.", d.as_secs_f64()),
        None => println!("Capturing until Ctrl+C."),
    }

    let started = Instant::now();
    while running.load(Ordering::SeqCst) && duration.map_or(true, |d| started.elapsed() < d) {
        std::thread::sleep(Duration::from_millis(50));
    }

    engine.stop_capture()?;
    if let Some(code) = engine.last_status() {
        log::warn!("audio subsystem reported status {:#010x} during capture", code);
    }
    let diagnostics = engine.diagnostics();
    log::info!(
        "drain iterations: {}, max iteration time: {:?}",
        diagnostics.drain_iterations,
        diagnostics.max_execution_time
    );

    let result = sink.finish()?;
    println!(
        "Finished. {} bytes ({:.2} s) written to {}",
        result.data_bytes,
        result.duration_secs,
        result.file_path.display()
    );

    if args.metadata {
        let path = write_metadata(&RecordingMetadata::new(&result, &target), &result.file_path)?;
        println!("Metadata: {}", path.display());
    }

    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn run(args: &Args) -> Result<()> {
    args.configuration().validate()?;
    args.capture_duration()?;
    anyhow::bail!("process loopback capture requires Windows 10 version 2004 (build 19041) or later")
}
