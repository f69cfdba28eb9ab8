//! System audio loopback via CoreAudio process taps (macOS 14.2+).
//!
//! A global tap records the mix every process sends to the output devices.
//! The tap cannot be read directly: it is wrapped in a private aggregate
//! device, clocked by the selected output device, and the aggregate device's
//! input is then captured like any other input device.
//!
//! Teardown runs in reverse: aggregate device, then tap.

use std::ptr::NonNull;

use objc2::rc::Retained;
use objc2::runtime::AnyObject;
use objc2::{msg_send, AnyThread, ClassType};
use objc2_core_audio::*;
use objc2_core_foundation::CFDictionary;
use objc2_foundation::{NSArray, NSMutableDictionary, NSNumber, NSString};
use uuid::Uuid;

use native_audio_core::models::error::CaptureError;

use crate::format::StreamDescription;
use crate::hal;

/// UID prefix of the aggregate devices this crate creates. They are
/// private, but visible to this process while a capture runs.
pub const AGGREGATE_UID_PREFIX: &str = "native-audio.system-tap.";

const AGGREGATE_NAME: &str = "Native Audio System Capture";

/// Format assumed when the tap does not report one.
const FALLBACK_SAMPLE_RATE: f64 = 48000.0;
const TAP_CHANNELS: u32 = 2;

/// Process taps exist from macOS 14.2.
pub fn is_supported() -> bool {
    let (major, minor) = macos_version();
    major > 14 || (major == 14 && minor >= 2)
}

fn macos_version() -> (u32, u32) {
    let output = std::process::Command::new("sw_vers")
        .arg("-productVersion")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .unwrap_or_default();
    parse_version(&output)
}

fn parse_version(version: &str) -> (u32, u32) {
    let mut parts = version.trim().split('.').map(|p| p.parse().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

/// A live global tap and the aggregate device that exposes it as input.
#[derive(Debug)]
pub struct ProcessTap {
    tap: AudioObjectID,
    aggregate: AudioObjectID,
    description: StreamDescription,
}

impl ProcessTap {
    /// Tap the system mix, clocked by the output device with `output_uid`.
    pub fn create(output_uid: &str) -> Result<Self, CaptureError> {
        if !is_supported() {
            return Err(CaptureError::ConfigurationFailed(
                "system audio capture requires macOS 14.2 or later".into(),
            ));
        }

        let processes: Retained<NSArray<NSNumber>> = NSArray::new();
        let tap_description = unsafe {
            CATapDescription::initStereoGlobalTapButExcludeProcesses(CATapDescription::alloc(), &processes)
        };
        unsafe {
            tap_description.setMuteBehavior(CATapMuteBehavior::Unmuted);
            tap_description.setPrivate(true);
        }

        let mut tap: AudioObjectID = 0;
        let status = unsafe { AudioHardwareCreateProcessTap(Some(&tap_description), &mut tap) };
        hal::check(status, "AudioHardwareCreateProcessTap")?;

        let tap_uuid = unsafe { tap_description.UUID().UUIDString() };
        let aggregate_uid = format!("{}{}", AGGREGATE_UID_PREFIX, Uuid::new_v4());
        let dictionary = unsafe {
            aggregate_device_dictionary(
                &NSString::from_str(&aggregate_uid),
                &tap_uuid,
                &NSString::from_str(output_uid),
            )
        };

        let mut aggregate: AudioObjectID = 0;
        let cf_dictionary: &CFDictionary = unsafe { &*(&*dictionary as *const NSMutableDictionary as *const CFDictionary) };
        let status = unsafe { AudioHardwareCreateAggregateDevice(cf_dictionary, NonNull::from(&mut aggregate)) };
        if let Err(e) = hal::check(status, "AudioHardwareCreateAggregateDevice") {
            unsafe {
                AudioHardwareDestroyProcessTap(tap);
            }
            return Err(e);
        }

        let description = hal::tap_description(tap).unwrap_or_else(|| {
            log::debug!("coreaudio: tap {} reports no format; assuming float32", tap);
            StreamDescription::float32(FALLBACK_SAMPLE_RATE, TAP_CHANNELS)
        });
        log::debug!(
            "coreaudio: tap {} on aggregate {} clocked by {:?}",
            tap,
            aggregate,
            output_uid
        );

        Ok(Self {
            tap,
            aggregate,
            description,
        })
    }

    /// The aggregate device to install the IO proc on.
    pub fn device(&self) -> AudioObjectID {
        self.aggregate
    }

    pub fn description(&self) -> StreamDescription {
        self.description
    }
}

impl Drop for ProcessTap {
    fn drop(&mut self) {
        unsafe {
            let status = AudioHardwareDestroyAggregateDevice(self.aggregate);
            if status != 0 {
                log::warn!("coreaudio: destroying aggregate {} failed: OSStatus {}", self.aggregate, status);
            }
            let status = AudioHardwareDestroyProcessTap(self.tap);
            if status != 0 {
                log::warn!("coreaudio: destroying tap {} failed: OSStatus {}", self.tap, status);
            }
        }
    }
}

/// Description of a private, auto-starting aggregate device holding the tap
/// and the clocking output device.
unsafe fn aggregate_device_dictionary(
    aggregate_uid: &NSString,
    tap_uuid: &NSString,
    output_uid: &NSString,
) -> Retained<NSMutableDictionary> {
    let set_str = |d: &NSMutableDictionary, key: &str, value: &NSString| {
        let key = NSString::from_str(key);
        let _: () = msg_send![d, setObject: value, forKey: &*key];
    };
    let set_int = |d: &NSMutableDictionary, key: &str, value: i32| {
        let key = NSString::from_str(key);
        let number: Retained<NSNumber> = msg_send![NSNumber::class(), numberWithInt: value];
        let _: () = msg_send![d, setObject: &*number, forKey: &*key];
    };
    let set_list = |d: &NSMutableDictionary, key: &str, entry: &NSMutableDictionary| {
        let key = NSString::from_str(key);
        let list: Retained<NSArray<AnyObject>> = msg_send![NSArray::<AnyObject>::class(), arrayWithObject: entry];
        let _: () = msg_send![d, setObject: &*list, forKey: &*key];
    };

    let dictionary: Retained<NSMutableDictionary> = NSMutableDictionary::new();
    set_str(&dictionary, "uid", aggregate_uid);
    set_str(&dictionary, "name", &NSString::from_str(AGGREGATE_NAME));
    set_int(&dictionary, "private", 1);
    set_int(&dictionary, "stacked", 0);
    set_int(&dictionary, "tapautostart", 1);
    set_str(&dictionary, "master", output_uid);

    let sub_device: Retained<NSMutableDictionary> = NSMutableDictionary::new();
    set_str(&sub_device, "uid", output_uid);
    set_list(&dictionary, "sub", &sub_device);

    let sub_tap: Retained<NSMutableDictionary> = NSMutableDictionary::new();
    set_str(&sub_tap, "uid", tap_uuid);
    set_int(&sub_tap, "drift", 1);
    set_list(&dictionary, "taps", &sub_tap);

    dictionary
}
