//! # native-audio
//!
//! Native audio capture engine for a host runtime: capture microphone input
//! or system output as interleaved 16-bit little-endian PCM.
//!
//! ## Architecture
//!
//! ```text
//! native-audio (this crate)
//! ├── controller   ← AudioController (start/stop, dispatch, device queries)
//! └── factory      ← create_platform_engine (WASAPI | CoreAudio | unsupported)
//!
//! native-audio-core      ← models, sample conversion, capture session, bridge
//! native-audio-windows   ← WASAPI platform (target_os = "windows")
//! native-audio-macos     ← CoreAudio platform (target_os = "macos")
//! ```
//!
//! ## Usage
//! ```ignore
//! use native_audio::{AudioController, DeviceType, EngineConfig};
//!
//! let mut controller = AudioController::new(EngineConfig::default())?;
//! controller.start(DeviceType::Input, "", |pcm| sink.write(&pcm), |err| eprintln!("{err}"))?;
//! while recording {
//!     controller.dispatch_timeout(Duration::from_millis(50));
//! }
//! controller.stop();
//! ```

pub mod controller;
pub mod factory;

pub use controller::AudioController;
pub use factory::{create_platform_engine, platform_name};

pub use native_audio_core::{
    AudioDevice, AudioEngine, AudioFormat, CaptureError, DeviceType, EngineConfig, PermissionKind, PermissionStatus,
    SessionState, DEVICE_TYPE_INPUT, DEVICE_TYPE_OUTPUT, SYSTEM_AUDIO_DEVICE_ID,
};
