//! CoreAudio HAL property reads.
//!
//! Every CoreAudio object (the system, a device, a stream, a tap) is an
//! `AudioObjectID` whose state is read through `AudioObjectGetPropertyData`
//! with a (selector, scope, element) address.

use std::ffi::c_void;
use std::ptr::NonNull;

use objc2::rc::Retained;
use objc2_core_audio::*;
use objc2_core_audio_types::{AudioBuffer, AudioBufferList, AudioStreamBasicDescription};
use objc2_foundation::NSString;

use native_audio_core::models::device::DeviceType;
use native_audio_core::models::error::CaptureError;

use crate::format::StreamDescription;

/// `kAudioTapPropertyFormat` ('tfmt'): the tap's stream description.
const AUDIO_TAP_PROPERTY_FORMAT: u32 = 0x7466_6D74;

/// `kAudioObjectUnknown`
const UNKNOWN_OBJECT: AudioObjectID = 0;

pub fn system_object() -> AudioObjectID {
    kAudioObjectSystemObject as AudioObjectID
}

fn address(selector: AudioObjectPropertySelector, scope: AudioObjectPropertyScope) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: scope,
        mElement: kAudioObjectPropertyElementMain,
    }
}

fn global(selector: AudioObjectPropertySelector) -> AudioObjectPropertyAddress {
    address(selector, kAudioObjectPropertyScopeGlobal)
}

/// Property scope holding a device's streams for one direction.
pub fn scope(device_type: DeviceType) -> AudioObjectPropertyScope {
    match device_type {
        DeviceType::Input => kAudioObjectPropertyScopeInput,
        DeviceType::Output => kAudioObjectPropertyScopeOutput,
    }
}

pub fn check(status: i32, what: &str) -> Result<(), CaptureError> {
    if status == 0 {
        Ok(())
    } else {
        Err(CaptureError::ConfigurationFailed(format!("{} failed: OSStatus {}", what, status)))
    }
}

/// Read a fixed-size property into `value`.
///
/// # Safety
/// `T` must match the layout CoreAudio writes for the property.
unsafe fn read<T>(object: AudioObjectID, mut address: AudioObjectPropertyAddress, value: &mut T) -> i32 {
    let mut size = std::mem::size_of::<T>() as u32;
    AudioObjectGetPropertyData(
        object,
        NonNull::from(&mut address),
        0,
        std::ptr::null(),
        NonNull::from(&mut size),
        NonNull::from(value).cast::<c_void>(),
    )
}

/// Read a variable-size property as an array of `T`.
///
/// # Safety
/// `T` must match the element layout CoreAudio writes for the property.
unsafe fn read_array<T: Copy + Default>(object: AudioObjectID, mut address: AudioObjectPropertyAddress) -> Result<Vec<T>, i32> {
    let mut size: u32 = 0;
    let status = AudioObjectGetPropertyDataSize(
        object,
        NonNull::from(&mut address),
        0,
        std::ptr::null(),
        NonNull::from(&mut size),
    );
    if status != 0 {
        return Err(status);
    }

    let element = std::mem::size_of::<T>();
    let mut values = vec![T::default(); (size as usize).div_ceil(element)];
    if values.is_empty() {
        return Ok(values);
    }

    let status = AudioObjectGetPropertyData(
        object,
        NonNull::from(&mut address),
        0,
        std::ptr::null(),
        NonNull::from(&mut size),
        NonNull::new_unchecked(values.as_mut_ptr().cast::<c_void>()),
    );
    if status != 0 {
        return Err(status);
    }
    values.truncate(size as usize / element);
    Ok(values)
}

/// Read a CFString property. CoreAudio hands out an owned reference.
unsafe fn read_string(object: AudioObjectID, address: AudioObjectPropertyAddress) -> Option<String> {
    let mut value: *mut NSString = std::ptr::null_mut();
    if read(object, address, &mut value) != 0 {
        return None;
    }
    let owned = Retained::from_raw(value)?;
    Some(owned.to_string())
}

/// Every device the HAL knows about, including private devices this
/// process created.
pub fn device_ids() -> Result<Vec<AudioObjectID>, CaptureError> {
    let ids = unsafe { read_array::<AudioObjectID>(system_object(), global(kAudioHardwarePropertyDevices)) };
    ids.map_err(|status| {
        CaptureError::ConfigurationFailed(format!("kAudioHardwarePropertyDevices failed: OSStatus {}", status))
    })
}

pub fn default_device(device_type: DeviceType) -> Option<AudioObjectID> {
    let selector = match device_type {
        DeviceType::Input => kAudioHardwarePropertyDefaultInputDevice,
        DeviceType::Output => kAudioHardwarePropertyDefaultOutputDevice,
    };
    let mut device: AudioObjectID = UNKNOWN_OBJECT;
    let status = unsafe { read(system_object(), global(selector), &mut device) };
    (status == 0 && device != UNKNOWN_OBJECT).then_some(device)
}

/// Persistent device UID; stable across reboots and unique per device.
pub fn device_uid(device: AudioObjectID) -> Option<String> {
    unsafe { read_string(device, global(kAudioDevicePropertyDeviceUID)) }.filter(|uid| !uid.is_empty())
}

pub fn device_name(device: AudioObjectID) -> Option<String> {
    unsafe { read_string(device, global(kAudioObjectPropertyName)) }.filter(|name| !name.is_empty())
}

/// Total channels across the device's streams in one direction.
pub fn channel_count(device: AudioObjectID, device_type: DeviceType) -> u32 {
    // AudioBufferList is variable length; u64 storage keeps it aligned.
    let storage = match unsafe {
        read_array::<u64>(device, address(kAudioDevicePropertyStreamConfiguration, scope(device_type)))
    } {
        Ok(storage) => storage,
        Err(_) => return 0,
    };
    if storage.len() * 8 < std::mem::size_of::<AudioBufferList>() {
        return 0;
    }

    unsafe {
        let list = &*(storage.as_ptr() as *const AudioBufferList);
        let buffers: *const AudioBuffer = list.mBuffers.as_ptr();
        (0..list.mNumberBuffers as usize)
            .map(|i| (*buffers.add(i)).mNumberChannels)
            .sum()
    }
}

/// Virtual format of the device's first stream in one direction. This is
/// the layout an IO proc receives.
pub fn stream_description(device: AudioObjectID, device_type: DeviceType) -> Option<StreamDescription> {
    let streams = unsafe {
        read_array::<AudioObjectID>(device, address(kAudioDevicePropertyStreams, scope(device_type)))
    }
    .ok()?;
    let stream = *streams.first()?;

    let mut asbd: AudioStreamBasicDescription = unsafe { std::mem::zeroed() };
    let status = unsafe { read(stream, global(kAudioStreamPropertyVirtualFormat), &mut asbd) };
    (status == 0 && asbd.mSampleRate > 0.0).then(|| StreamDescription::from_asbd(&asbd))
}

/// Stream description of a process tap.
pub fn tap_description(tap: AudioObjectID) -> Option<StreamDescription> {
    let mut asbd: AudioStreamBasicDescription = unsafe { std::mem::zeroed() };
    let status = unsafe { read(tap, global(AUDIO_TAP_PROPERTY_FORMAT), &mut asbd) };
    (status == 0 && asbd.mSampleRate > 0.0).then(|| StreamDescription::from_asbd(&asbd))
}

/// False once the device has been unplugged or otherwise torn down.
pub fn is_alive(device: AudioObjectID) -> bool {
    let mut alive: u32 = 0;
    let status = unsafe { read(device, global(kAudioDevicePropertyDeviceIsAlive), &mut alive) };
    status == 0 && alive != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_listed_devices() {
        let devices = device_ids().unwrap();
        for device_type in [DeviceType::Input, DeviceType::Output] {
            if let Some(default) = default_device(device_type) {
                assert!(devices.contains(&default));
                assert!(is_alive(default));
                assert!(channel_count(default, device_type) > 0);
            }
        }
    }

    #[test]
    fn unknown_object_has_no_properties() {
        assert_eq!(device_uid(UNKNOWN_OBJECT), None);
        assert_eq!(channel_count(UNKNOWN_OBJECT, DeviceType::Input), 0);
        assert!(!is_alive(UNKNOWN_OBJECT));
    }
}
