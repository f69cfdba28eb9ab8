use crate::models::device::{AudioDevice, AudioFormat, PermissionKind, PermissionStatus};
use crate::models::error::CaptureError;
use crate::traits::capture_backend::{CaptureBackend, CaptureRequest};

/// Everything an OS backend has to provide to become an engine.
///
/// Implemented by:
/// - `WasapiPlatform` (Windows)
/// - `CoreAudioPlatform` (macOS)
pub trait AudioPlatform: Send + 'static {
    type Backend: CaptureBackend;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// All input and output endpoints. Backend failures degrade to an
    /// empty list.
    fn devices(&self) -> Vec<AudioDevice>;

    /// Native mix format of an endpoint, or `AudioFormat::unavailable()`.
    fn device_format(&self, device_id: &str) -> AudioFormat;

    /// Non-prompting read of OS-granted capture capabilities.
    fn check_permission(&self) -> PermissionStatus;

    /// Non-prompting read of a single capability. Backends whose checks
    /// have side effects override this to query only `kind`.
    fn is_permitted(&self, kind: PermissionKind) -> bool {
        self.check_permission().allows(kind)
    }

    /// Run the OS consent flow for `kind`. May block.
    fn request_permission(&self, kind: PermissionKind) -> bool;

    /// Validate a capture request and build the backend that will open it.
    fn backend(&self, request: &CaptureRequest) -> Result<Self::Backend, CaptureError>;
}
