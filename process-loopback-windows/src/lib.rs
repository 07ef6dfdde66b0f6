//! # process-loopback-windows
//!
//! Windows WASAPI backend for process-loopback.
//!
//! Provides:
//! - `WasapiSubsystem`: process loopback activation via `ActivateAudioInterfaceAsync`
//! - `WasapiClient` / `WasapiCaptureBuffer`: event-driven shared-mode stream and packet reader
//! - `WasapiEvent`: the sample-ready event
//! - `ComGuard` / `MmcssGuard`: COM apartment and real-time priority scopes
//!
//! ## Platform Requirements
//! - Windows 10 2004+ (build 19041) for process loopback
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use process_loopback_core::{CaptureEngine, LoopbackMode};
//! use process_loopback_windows::{ComGuard, WasapiSubsystem};
//!
//! let _com = ComGuard::initialize_mta();
//! let mut engine = CaptureEngine::new(WasapiSubsystem::new());
//! engine.set_format(44100, 16, 2)?;
//! engine.set_target_process(pid, LoopbackMode::IncludeTree)?;
//! engine.set_callback(|bytes| { /* ... */ })?;
//! engine.start_capture()?;
//! ```

#[cfg(target_os = "windows")]
pub mod activation;
#[cfg(target_os = "windows")]
pub mod audio_client;
#[cfg(target_os = "windows")]
pub mod capture_buffer;
#[cfg(target_os = "windows")]
pub mod com;
#[cfg(target_os = "windows")]
pub mod event;
#[cfg(target_os = "windows")]
pub mod mmcss;
#[cfg(target_os = "windows")]
pub mod subsystem;

#[cfg(target_os = "windows")]
pub use com::ComGuard;
#[cfg(target_os = "windows")]
pub use subsystem::WasapiSubsystem;
