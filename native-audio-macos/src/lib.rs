//! # native-audio-macos
//!
//! macOS CoreAudio backend for the native audio engine, built on the HAL
//! (`AudioObject` properties and device IO procs).
//!
//! Provides:
//! - `CoreAudioPlatform` / `CoreAudioEngine`: the `AudioPlatform` the core's
//!   `PlatformEngine` drives on macOS
//! - `CoreAudioBackend` / `CoreAudioStream`: capture through an IO proc that
//!   feeds a bounded queue the capture thread waits on
//! - `process_tap`: system audio loopback via a global process tap
//!   (macOS 14.2+)
//! - `device_enumerator`: input and output devices with default tagging
//! - `permissions`: TCC microphone / system audio consent
//!
//! Device ids are CoreAudio device UIDs.

#[cfg(target_os = "macos")]
pub mod device_enumerator;
#[cfg(target_os = "macos")]
pub mod format;
#[cfg(target_os = "macos")]
pub mod hal;
#[cfg(target_os = "macos")]
pub mod hal_stream;
#[cfg(target_os = "macos")]
pub mod permissions;
#[cfg(target_os = "macos")]
pub mod platform;
#[cfg(target_os = "macos")]
pub mod process_tap;

#[cfg(target_os = "macos")]
pub use hal_stream::{CoreAudioBackend, CoreAudioStream};
#[cfg(target_os = "macos")]
pub use platform::{create_engine, CoreAudioEngine, CoreAudioPlatform};
