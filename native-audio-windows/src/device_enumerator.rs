//! Windows audio device enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to list capture (microphone) and render
//! (speaker/headphone) endpoints with friendly names, and to resolve an
//! engine device id (opaque endpoint id, empty, or the system sentinel) to
//! an `IMMDevice`.

use windows::core::{HSTRING, PWSTR};
use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use native_audio_core::models::device::{AudioDevice, DeviceType, SYSTEM_AUDIO_DEVICE_ID};
use native_audio_core::models::error::CaptureError;

const UNKNOWN_DEVICE_NAME: &str = "Unknown Device";

/// Audio device enumerator using the Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Create a new device enumerator.
    ///
    /// Requires COM to be initialized on the calling thread.
    pub fn new() -> Result<Self, CaptureError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to create enumerator: {}", e)))?;
            Ok(Self { enumerator })
        }
    }

    /// All active endpoints, inputs first. A failing direction is logged and
    /// contributes nothing.
    pub fn devices(&self) -> Vec<AudioDevice> {
        let mut devices = Vec::new();
        for device_type in [DeviceType::Input, DeviceType::Output] {
            match self.list_devices(device_type) {
                Ok(found) => devices.extend(found),
                Err(e) => log::warn!("enumerating {} endpoints failed: {}", device_type, e),
            }
        }
        devices
    }

    /// Active endpoints of one direction, tagged against that direction's
    /// default endpoint.
    pub fn list_devices(&self, device_type: DeviceType) -> Result<Vec<AudioDevice>, CaptureError> {
        let data_flow = data_flow(device_type);
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(data_flow, DEVICE_STATE_ACTIVE)
                .map_err(|e| CaptureError::ConfigurationFailed(format!("EnumAudioEndpoints failed: {}", e)))?;

            let count = collection
                .GetCount()
                .map_err(|e| CaptureError::ConfigurationFailed(format!("GetCount failed: {}", e)))?;

            let default_id = self.default_device_id(device_type);

            let mut devices = Vec::with_capacity(count as usize);
            for i in 0..count {
                let device = match collection.Item(i) {
                    Ok(d) => d,
                    Err(_) => continue,
                };

                let Some(id) = endpoint_id(&device) else {
                    log::debug!("skipping {} endpoint {} without a readable id", device_type, i);
                    continue;
                };

                let name = friendly_name(&device).unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string());
                let is_default = default_id.as_deref() == Some(id.as_str());

                devices.push(AudioDevice {
                    id,
                    name,
                    device_type,
                    is_default,
                });
            }

            Ok(devices)
        }
    }

    /// Id of the default console endpoint for `device_type`, if any.
    pub fn default_device_id(&self, device_type: DeviceType) -> Option<String> {
        unsafe {
            self.enumerator
                .GetDefaultAudioEndpoint(data_flow(device_type), eConsole)
                .ok()
                .and_then(|device| endpoint_id(&device))
        }
    }

    /// Resolve an engine device id to an endpoint.
    ///
    /// Empty selects the default endpoint of `device_type`; the system
    /// sentinel selects the default render endpoint.
    pub fn resolve(&self, device_type: DeviceType, device_id: &str) -> Result<IMMDevice, CaptureError> {
        let not_available = |e: windows::core::Error| {
            log::debug!("resolving endpoint {:?} failed: {}", device_id, e);
            CaptureError::DeviceNotAvailable(display_id(device_id).to_string())
        };

        unsafe {
            if device_id == SYSTEM_AUDIO_DEVICE_ID {
                return self
                    .enumerator
                    .GetDefaultAudioEndpoint(eRender, eConsole)
                    .map_err(not_available);
            }
            if device_id.is_empty() {
                return self
                    .enumerator
                    .GetDefaultAudioEndpoint(data_flow(device_type), eConsole)
                    .map_err(not_available);
            }
            self.enumerator
                .GetDevice(&HSTRING::from(device_id))
                .map_err(not_available)
        }
    }
}

fn data_flow(device_type: DeviceType) -> EDataFlow {
    match device_type {
        DeviceType::Input => eCapture,
        DeviceType::Output => eRender,
    }
}

fn display_id(device_id: &str) -> &str {
    if device_id.is_empty() {
        "default"
    } else {
        device_id
    }
}

/// Endpoint id string; the COM allocation is freed before returning.
fn endpoint_id(device: &IMMDevice) -> Option<String> {
    unsafe {
        let raw: PWSTR = device.GetId().ok()?;
        let id = raw.to_string().ok();
        CoTaskMemFree(Some(raw.0 as *const _));
        id.filter(|id| !id.is_empty())
    }
}

/// Read the PKEY_Device_FriendlyName property from a device.
fn friendly_name(device: &IMMDevice) -> Option<String> {
    unsafe {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;
        let value = store.GetValue(&PKEY_Device_FriendlyName).ok()?;
        let name = value.to_string();
        (!name.is_empty()).then_some(name)
    }
}
