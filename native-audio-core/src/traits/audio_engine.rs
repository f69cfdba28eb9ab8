use crate::bridge::callback_bridge::CallbackBridge;
use crate::models::config::EngineConfig;
use crate::models::device::{AudioDevice, AudioFormat, DeviceType, PermissionKind, PermissionStatus};
use crate::models::error::CaptureError;
use crate::models::state::SessionState;

/// The engine surface, one implementation per build target.
pub trait AudioEngine: Send {
    /// Start capturing from `device_id`. No-op if a session is already
    /// active. Setup and stream failures arrive through `bridge`; only
    /// invalid input is returned here.
    fn start(
        &mut self,
        device_type: DeviceType,
        device_id: &str,
        bridge: CallbackBridge,
    ) -> Result<(), CaptureError>;

    /// Stop the active session and join its capture thread. Idempotent.
    fn stop(&mut self);

    fn state(&self) -> SessionState;

    fn config(&self) -> &EngineConfig;

    fn get_devices(&self) -> Vec<AudioDevice>;

    /// `sample_rate == 0` in the result means the query failed.
    fn get_device_format(&self, device_id: &str) -> AudioFormat;

    fn check_permission(&self) -> PermissionStatus;

    fn request_permission(&self, kind: PermissionKind) -> bool;
}
