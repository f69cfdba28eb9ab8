//! CoreAudio device enumeration through the HAL.
//!
//! Device ids are CoreAudio device UIDs, so two devices with the same
//! display name stay distinct. A device with both inputs and outputs is
//! listed once per direction under the same UID.

use objc2_core_audio::AudioObjectID;

use native_audio_core::models::device::{AudioDevice, DeviceType, SYSTEM_AUDIO_DEVICE_ID};
use native_audio_core::models::error::CaptureError;

use crate::hal;
use crate::process_tap::AGGREGATE_UID_PREFIX;

const UNKNOWN_DEVICE_NAME: &str = "Unknown Device";

/// Inputs, then outputs. A direction whose listing fails is logged and
/// contributes nothing.
pub fn list_devices() -> Vec<AudioDevice> {
    let mut devices = Vec::new();
    for device_type in [DeviceType::Input, DeviceType::Output] {
        match list_direction(device_type) {
            Ok(found) => devices.extend(found),
            Err(e) => log::warn!("enumerating {} devices failed: {}", device_type, e),
        }
    }
    devices
}

/// Devices with at least one channel in `device_type`'s direction, tagged
/// against that direction's default device.
pub fn list_direction(device_type: DeviceType) -> Result<Vec<AudioDevice>, CaptureError> {
    let default = hal::default_device(device_type);
    let mut devices = Vec::new();

    for (device, uid) in direction_devices(device_type)? {
        let name = hal::device_name(device).unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string());
        devices.push(AudioDevice {
            id: uid,
            name,
            device_type,
            is_default: default == Some(device),
        });
    }
    Ok(devices)
}

/// `(object id, uid)` of every capturable device in one direction. Our own
/// tap aggregates are skipped.
fn direction_devices(device_type: DeviceType) -> Result<Vec<(AudioObjectID, String)>, CaptureError> {
    let mut found = Vec::new();
    for device in hal::device_ids()? {
        if hal::channel_count(device, device_type) == 0 {
            continue;
        }
        let Some(uid) = hal::device_uid(device) else {
            log::debug!("skipping {} device {} without a UID", device_type, device);
            continue;
        };
        if uid.starts_with(AGGREGATE_UID_PREFIX) {
            continue;
        }
        found.push((device, uid));
    }
    Ok(found)
}

/// Resolve an engine device id. Empty selects the default device of
/// `device_type`; the system sentinel selects the default output device.
pub fn resolve(device_type: DeviceType, device_id: &str) -> Result<AudioObjectID, CaptureError> {
    let not_available = || {
        CaptureError::DeviceNotAvailable(if device_id.is_empty() {
            "default".to_string()
        } else {
            device_id.to_string()
        })
    };

    if device_id == SYSTEM_AUDIO_DEVICE_ID {
        return hal::default_device(DeviceType::Output).ok_or_else(not_available);
    }
    if device_id.is_empty() {
        return hal::default_device(device_type).ok_or_else(not_available);
    }

    direction_devices(device_type)?
        .into_iter()
        .find(|(_, uid)| uid == device_id)
        .map(|(device, _)| device)
        .ok_or_else(not_available)
}
