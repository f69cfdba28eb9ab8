use thiserror::Error;

use super::device::PermissionKind;

/// Errors that can occur during audio capture operations.
///
/// Setup and steady-state failures on the capture thread are never returned
/// to the caller of `start`; they travel through the callback bridge as their
/// display text. Everything else is returned synchronously.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("{0} permission denied")]
    PermissionDenied(PermissionKind),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no audio engine is available for this platform")]
    UnsupportedPlatform,

    #[error("audio device not available: {0}")]
    DeviceNotAvailable(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("failed to get device format for {0:?}")]
    FormatUnavailable(String),

    #[error("capture stream failed: {0}")]
    StreamFailed(String),

    #[error("failed to spawn capture thread: {0}")]
    ThreadSpawn(String),
}
