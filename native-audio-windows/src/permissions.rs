//! Windows microphone privacy permission check.
//!
//! On Windows 10 1803+, microphone access is controlled by the privacy
//! settings at Settings > Privacy > Microphone. Desktop apps are generally
//! allowed unless the user has disabled the global toggle.
//!
//! Unlike macOS TCC, there's no per-app consent dialog for unpackaged desktop
//! apps, so a request never prompts and reports granted. Loopback capture is
//! unrestricted.

use windows::Win32::Foundation::E_ACCESSDENIED;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use native_audio_core::models::device::{PermissionKind, PermissionStatus};
use native_audio_core::models::error::CaptureError;

use crate::com::ComGuard;

/// Non-prompting read of both capabilities.
pub fn check_permission() -> PermissionStatus {
    PermissionStatus {
        mic: is_permitted(PermissionKind::Mic),
        system: is_permitted(PermissionKind::System),
    }
}

/// Read one capability. System audio never touches the microphone.
pub fn is_permitted(kind: PermissionKind) -> bool {
    match kind {
        PermissionKind::Mic => check_microphone_permission().unwrap_or_else(|e| {
            log::warn!("microphone permission check failed: {}", e);
            false
        }),
        PermissionKind::System => check_system_audio_permission(),
    }
}

/// No consent model; granted without prompting.
pub fn request_permission(kind: PermissionKind) -> bool {
    log::debug!("{} permission needs no consent on Windows", kind);
    true
}

/// Check if microphone access is available.
///
/// Attempts to activate the default capture device. `E_ACCESSDENIED` or
/// `AUDCLNT_E_DEVICE_IN_USE` means microphone access is off in Windows
/// Privacy Settings (or held exclusively).
pub fn check_microphone_permission() -> Result<bool, CaptureError> {
    let _com = ComGuard::init()?;
    unsafe { check_mic_access_inner() }
}

unsafe fn check_mic_access_inner() -> Result<bool, CaptureError> {
    let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
        .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to create enumerator: {}", e)))?;

    let device = match enumerator.GetDefaultAudioEndpoint(eCapture, eConsole) {
        Ok(d) => d,
        Err(_) => return Ok(false), // No capture device
    };

    let result: windows::core::Result<IAudioClient> = device.Activate(CLSCTX_ALL, None);

    match result {
        Ok(_) => Ok(true),
        Err(e) if e.code() == E_ACCESSDENIED || e.code() == AUDCLNT_E_DEVICE_IN_USE => Ok(false),
        Err(e) => {
            log::warn!("Unexpected error checking mic permission: {}", e);
            Ok(true)
        }
    }
}

/// System audio (loopback) capture does not require any permissions on Windows.
pub fn check_system_audio_permission() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_is_always_permitted() {
        assert!(check_permission().system);
        assert!(is_permitted(PermissionKind::System));
    }

    #[test]
    fn requests_never_prompt() {
        assert!(request_permission(PermissionKind::Mic));
        assert!(request_permission(PermissionKind::System));
    }
}
