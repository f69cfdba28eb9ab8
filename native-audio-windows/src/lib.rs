//! # native-audio-windows
//!
//! Windows WASAPI backend for the native audio engine.
//!
//! Provides:
//! - `WasapiPlatform` / `WasapiEngine`: the `AudioPlatform` the core's
//!   `PlatformEngine` drives on Windows
//! - `WasapiBackend` / `WasapiStream`: event-driven capture, loopback on
//!   render endpoints
//! - `DeviceEnumerator`: audio device enumeration via the MMDevice API
//! - `permissions`: Windows microphone privacy check
//!
//! ## Platform Requirements
//! - Windows 10 1703+ (build 15063) for event-driven loopback
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use native_audio_core::bridge::callback_bridge;
//! use native_audio_core::{AudioEngine, DeviceType, EngineConfig};
//! use native_audio_windows::create_engine;
//!
//! let mut engine = create_engine(EngineConfig::default())?;
//! let (bridge, mut dispatcher) = callback_bridge::channel(64, timeout, on_data, on_error);
//! engine.start(DeviceType::Output, "system", bridge)?;
//! ```

#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod format;
#[cfg(target_os = "windows")]
pub mod permissions;
#[cfg(target_os = "windows")]
pub mod platform;
#[cfg(target_os = "windows")]
pub mod wasapi_stream;

#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use platform::{create_engine, WasapiEngine, WasapiPlatform};
#[cfg(target_os = "windows")]
pub use wasapi_stream::{WasapiBackend, WasapiStream};
