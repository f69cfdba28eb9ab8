//! # native-audio-core
//!
//! Platform-agnostic native audio capture core library.
//!
//! Provides the device model, native-to-PCM16 sample conversion, the
//! background capture session, and the bridge that carries chunks and
//! errors from the capture thread to the host. OS backends (Windows WASAPI,
//! macOS Core Audio) implement `AudioPlatform` and become engines through
//! the generic `PlatformEngine`.
//!
//! ## Architecture
//!
//! ```text
//! native-audio-core (this crate)
//! ├── traits/       ← AudioEngine, AudioPlatform, CaptureBackend, CaptureStream
//! ├── models/       ← CaptureError, SessionState, EngineConfig, AudioDevice, AudioFormat, etc.
//! ├── processing/   ← sample conversion to 16-bit little-endian PCM
//! ├── bridge/       ← CallbackBridge / EventDispatcher (capture thread → host)
//! └── session/      ← CaptureSession (capture thread), PlatformEngine (generic engine)
//! ```

pub mod bridge;
pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export key types at crate root for convenience.
pub use bridge::callback_bridge::{CallbackBridge, CaptureEvent, DataCallback, ErrorCallback, EventDispatcher};
pub use models::config::EngineConfig;
pub use models::device::{
    AudioDevice, AudioFormat, DeviceType, PermissionKind, PermissionStatus, DEVICE_TYPE_INPUT, DEVICE_TYPE_OUTPUT,
    OUTPUT_BIT_DEPTH, SYSTEM_AUDIO_DEVICE_ID,
};
pub use models::error::CaptureError;
pub use models::state::SessionState;
pub use processing::sample_converter::{convert_to_pcm16, NativeFormat, SampleEncoding};
pub use session::capture_session::CaptureSession;
pub use session::platform_engine::PlatformEngine;
pub use traits::audio_engine::AudioEngine;
pub use traits::audio_platform::AudioPlatform;
pub use traits::capture_backend::{CaptureBackend, CaptureRequest, CaptureStream, NativePacket, WaitOutcome};
