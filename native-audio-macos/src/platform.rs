use native_audio_core::models::config::EngineConfig;
use native_audio_core::models::device::{
    AudioDevice, AudioFormat, DeviceType, PermissionKind, PermissionStatus, SYSTEM_AUDIO_DEVICE_ID,
};
use native_audio_core::models::error::CaptureError;
use native_audio_core::session::platform_engine::PlatformEngine;
use native_audio_core::traits::audio_platform::AudioPlatform;
use native_audio_core::traits::capture_backend::CaptureRequest;

use crate::device_enumerator;
use crate::hal;
use crate::hal_stream::CoreAudioBackend;
use crate::permissions;

/// The macOS engine.
pub type CoreAudioEngine = PlatformEngine<CoreAudioPlatform>;

pub fn create_engine(config: EngineConfig) -> Result<CoreAudioEngine, CaptureError> {
    PlatformEngine::new(CoreAudioPlatform, config)
}

/// CoreAudio implementation of [`AudioPlatform`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreAudioPlatform;

impl CoreAudioPlatform {
    /// Input format for input devices, output format for output-only
    /// devices and the system sentinel.
    fn query_format(device_id: &str) -> Result<AudioFormat, CaptureError> {
        let (device, direction) = if device_id == SYSTEM_AUDIO_DEVICE_ID {
            (device_enumerator::resolve(DeviceType::Output, device_id)?, DeviceType::Output)
        } else {
            match device_enumerator::resolve(DeviceType::Input, device_id) {
                Ok(device) => (device, DeviceType::Input),
                Err(_) => (device_enumerator::resolve(DeviceType::Output, device_id)?, DeviceType::Output),
            }
        };
        hal::stream_description(device, direction)
            .map(|description| description.audio_format())
            .ok_or_else(|| CaptureError::FormatUnavailable(device_id.to_string()))
    }
}

impl AudioPlatform for CoreAudioPlatform {
    type Backend = CoreAudioBackend;

    fn name(&self) -> &'static str {
        "coreaudio"
    }

    fn devices(&self) -> Vec<AudioDevice> {
        device_enumerator::list_devices()
    }

    fn device_format(&self, device_id: &str) -> AudioFormat {
        Self::query_format(device_id).unwrap_or_else(|e| {
            log::debug!("coreaudio: format query for {:?} failed: {}", device_id, e);
            AudioFormat::unavailable()
        })
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

    fn backend(&self, request: &CaptureRequest) -> Result<CoreAudioBackend, CaptureError> {
        Ok(CoreAudioBackend::new(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonexistent_device_has_no_format() {
        assert_eq!(CoreAudioPlatform.device_format("no-such-uid").sample_rate, 0);
    }

    #[test]
    fn listed_devices_report_sixteen_bit_output() {
        let platform = CoreAudioPlatform;
        for device in platform.devices() {
            let format = platform.device_format(&device.id);
            if format.is_available() {
                assert_eq!(format.bit_depth, 16);
                assert!(format.raw_bit_depth > 0);
            }
        }
    }
}
