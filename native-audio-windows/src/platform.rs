use native_audio_core::models::config::EngineConfig;
use native_audio_core::models::device::{AudioDevice, AudioFormat, DeviceType, PermissionKind, PermissionStatus};
use native_audio_core::models::error::CaptureError;
use native_audio_core::session::platform_engine::PlatformEngine;
use native_audio_core::traits::audio_platform::AudioPlatform;
use native_audio_core::traits::capture_backend::CaptureRequest;

use crate::com::ComGuard;
use crate::device_enumerator::DeviceEnumerator;
use crate::format::MixFormat;
use crate::permissions;
use crate::wasapi_stream::WasapiBackend;

/// The Windows engine.
pub type WasapiEngine = PlatformEngine<WasapiPlatform>;

pub fn create_engine(config: EngineConfig) -> Result<WasapiEngine, CaptureError> {
    PlatformEngine::new(WasapiPlatform, config)
}

/// WASAPI implementation of [`AudioPlatform`].
///
/// Stateless: every query joins COM on the calling thread and builds its
/// own enumerator.
#[derive(Debug, Clone, Copy, Default)]
pub struct WasapiPlatform;

impl WasapiPlatform {
    fn query_format(device_id: &str) -> Result<AudioFormat, CaptureError> {
        let _com = ComGuard::init()?;
        let enumerator = DeviceEnumerator::new()?;
        let device = enumerator.resolve(DeviceType::Input, device_id)?;
        unsafe {
            let client: windows::Win32::Media::Audio::IAudioClient = device
                .Activate(windows::Win32::System::Com::CLSCTX_ALL, None)
                .map_err(|e| CaptureError::ConfigurationFailed(format!("Activate failed: {}", e)))?;
            let mix_format = MixFormat::query(&client)?;
            Ok(mix_format.descriptor().audio_format())
        }
    }
}

impl AudioPlatform for WasapiPlatform {
    type Backend = WasapiBackend;

    fn name(&self) -> &'static str {
        "wasapi"
    }

    fn devices(&self) -> Vec<AudioDevice> {
        let _com = match ComGuard::init() {
            Ok(guard) => guard,
            Err(e) => {
                log::warn!("wasapi: device enumeration unavailable: {}", e);
                return Vec::new();
            }
        };
        match DeviceEnumerator::new() {
            Ok(enumerator) => enumerator.devices(),
            Err(e) => {
                log::warn!("wasapi: device enumeration unavailable: {}", e);
                Vec::new()
            }
        }
    }

    fn device_format(&self, device_id: &str) -> AudioFormat {
        match Self::query_format(device_id) {
            Ok(format) => format,
            Err(e) => {
                log::debug!("wasapi: format query for {:?} failed: {}", device_id, e);
                AudioFormat::unavailable()
            }
        }
    }

    fn check_permission(&self) -> PermissionStatus {
        permissions::check_permission()
    }

    fn is_permitted(&self, kind: PermissionKind) -> bool {
        permissions::is_permitted(kind)
    }

    fn request_permission(&self, kind: PermissionKind) -> bool {
        permissions::request_permission(kind)
    }

    fn backend(&self, request: &CaptureRequest) -> Result<WasapiBackend, CaptureError> {
        Ok(WasapiBackend::new(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonexistent_device_has_no_format() {
        let format = WasapiPlatform.device_format("{0.0.1.00000000}.{00000000-0000-0000-0000-000000000000}");
        assert_eq!(format.sample_rate, 0);
    }

    #[test]
    fn listed_devices_report_sixteen_bit_output() {
        let platform = WasapiPlatform;
        for device in platform.devices() {
            let format = platform.device_format(&device.id);
            if format.is_available() {
                assert_eq!(format.bit_depth, 16);
                assert!(format.raw_bit_depth > 0);
            }
        }
    }
}
