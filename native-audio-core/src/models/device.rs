use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Reserved device id selecting system-wide (loopback) capture on the
/// default output endpoint.
pub const SYSTEM_AUDIO_DEVICE_ID: &str = "system";

/// String form of [`DeviceType::Input`].
pub const DEVICE_TYPE_INPUT: &str = "input";

/// String form of [`DeviceType::Output`].
pub const DEVICE_TYPE_OUTPUT: &str = "output";

/// Output bit depth of every delivered buffer.
pub const OUTPUT_BIT_DEPTH: u16 = 16;

/// Direction of an audio endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Input,
    Output,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => DEVICE_TYPE_INPUT,
            Self::Output => DEVICE_TYPE_OUTPUT,
        }
    }

    /// Capturing from an output endpoint means loopback.
    pub fn is_loopback(&self) -> bool {
        matches!(self, Self::Output)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(DEVICE_TYPE_INPUT) {
            Ok(Self::Input)
        } else if s.eq_ignore_ascii_case(DEVICE_TYPE_OUTPUT) {
            Ok(Self::Output)
        } else {
            Err(CaptureError::InvalidInput(format!("unknown device type: {:?}", s)))
        }
    }
}

/// An audio endpoint available for capture.
///
/// `id` is an opaque backend token: it is only ever handed back to the
/// backend that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub is_default: bool,
}

impl AudioDevice {
    /// Same endpoint iff the ids match; names and default flags may drift.
    pub fn same_endpoint(&self, other: &AudioDevice) -> bool {
        self.id == other.id
    }
}

/// Format reported for an endpoint.
///
/// `bit_depth` is the width of delivered samples and is always 16.
/// `raw_bit_depth` is the native width and purely informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub raw_bit_depth: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16, raw_bit_depth: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth: OUTPUT_BIT_DEPTH,
            raw_bit_depth,
        }
    }

    /// The failure sentinel: `sample_rate == 0`.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        self.sample_rate > 0
    }
}

/// Which OS capability a permission request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionKind {
    Mic,
    System,
}

impl PermissionKind {
    /// Capability needed to capture from a device of the given type.
    pub fn for_device_type(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::Input => Self::Mic,
            DeviceType::Output => Self::System,
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mic => f.write_str("microphone"),
            Self::System => f.write_str("system audio"),
        }
    }
}

/// Current OS-granted capture capabilities. Reading it never prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionStatus {
    pub mic: bool,
    pub system: bool,
}

impl PermissionStatus {
    /// Status on platforms without a consent model.
    pub fn granted() -> Self {
        Self {
            mic: true,
            system: true,
        }
    }

    pub fn allows(&self, kind: PermissionKind) -> bool {
        match kind {
            PermissionKind::Mic => self.mic,
            PermissionKind::System => self.system,
        }
    }
}
