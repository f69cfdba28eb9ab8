//! Mix format negotiation.
//!
//! Reads the shared-mode mix format of an `IAudioClient` and maps it to the
//! core's `NativeFormat` (what the capture stream decodes) and
//! `AudioFormat` (what `get_device_format` reports).

use windows::core::GUID;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::CoTaskMemFree;

use native_audio_core::models::device::AudioFormat;
use native_audio_core::models::error::CaptureError;
use native_audio_core::processing::sample_converter::{NativeFormat, SampleEncoding};

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// KSDATAFORMAT_SUBTYPE_PCM
const SUBTYPE_PCM: GUID = GUID::from_u128(0x00000001_0000_0010_8000_00aa00389b71);
/// KSDATAFORMAT_SUBTYPE_IEEE_FLOAT
const SUBTYPE_IEEE_FLOAT: GUID = GUID::from_u128(0x00000003_0000_0010_8000_00aa00389b71);

/// Fields of a `WAVEFORMATEX`/`WAVEFORMATEXTENSIBLE` the engine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub format_tag: u16,
    pub sample_rate: u32,
    pub channels: u16,
    /// Container width.
    pub bits_per_sample: u16,
    pub block_align: u16,
    /// Present only for `WAVE_FORMAT_EXTENSIBLE`.
    pub sub_format: Option<GUID>,
    /// Extensible `wValidBitsPerSample`; 0 when absent.
    pub valid_bits: u16,
}

impl FormatDescriptor {
    /// Decode a `WAVEFORMATEX` that may be the head of a
    /// `WAVEFORMATEXTENSIBLE`.
    ///
    /// # Safety
    /// `ptr` must point to a valid format block of at least
    /// `size_of::<WAVEFORMATEX>() + cbSize` bytes.
    pub unsafe fn read(ptr: *const WAVEFORMATEX) -> Self {
        let base = std::ptr::read_unaligned(ptr);
        let extensible = base.wFormatTag == WAVE_FORMAT_EXTENSIBLE
            && base.cbSize as usize
                >= std::mem::size_of::<WAVEFORMATEXTENSIBLE>() - std::mem::size_of::<WAVEFORMATEX>();

        let (sub_format, valid_bits) = if extensible {
            let ext = ptr as *const WAVEFORMATEXTENSIBLE;
            let sub_format = std::ptr::read_unaligned(std::ptr::addr_of!((*ext).SubFormat));
            let samples = std::ptr::read_unaligned(std::ptr::addr_of!((*ext).Samples));
            (Some(sub_format), samples.wValidBitsPerSample)
        } else {
            (None, 0)
        };

        Self {
            format_tag: base.wFormatTag,
            sample_rate: base.nSamplesPerSec,
            channels: base.nChannels,
            bits_per_sample: base.wBitsPerSample,
            block_align: base.nBlockAlign,
            sub_format,
            valid_bits,
        }
    }

    /// Sample encoding by container width and subtype.
    pub fn encoding(&self) -> SampleEncoding {
        let bits = self.bits_per_sample;
        match (self.format_tag, self.sub_format) {
            (WAVE_FORMAT_PCM, _) => SampleEncoding::from_pcm_bits(bits),
            (WAVE_FORMAT_IEEE_FLOAT, _) => SampleEncoding::from_float_bits(bits),
            (WAVE_FORMAT_EXTENSIBLE, Some(sub)) if sub == SUBTYPE_PCM => SampleEncoding::from_pcm_bits(bits),
            (WAVE_FORMAT_EXTENSIBLE, Some(sub)) if sub == SUBTYPE_IEEE_FLOAT => SampleEncoding::from_float_bits(bits),
            _ => SampleEncoding::Unsupported { bits },
        }
    }

    /// True bit depth: the valid-bits field when extensible and non-zero,
    /// the container width otherwise.
    pub fn raw_bit_depth(&self) -> u16 {
        if self.sub_format.is_some() && self.valid_bits != 0 {
            self.valid_bits
        } else {
            self.bits_per_sample
        }
    }

    pub fn native_format(&self) -> NativeFormat {
        NativeFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            encoding: self.encoding(),
        }
    }

    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channels, self.raw_bit_depth())
    }
}

/// Owned mix format returned by `IAudioClient::GetMixFormat`.
pub struct MixFormat {
    ptr: *mut WAVEFORMATEX,
    descriptor: FormatDescriptor,
}

impl MixFormat {
    pub fn query(client: &IAudioClient) -> Result<Self, CaptureError> {
        unsafe {
            let ptr = client
                .GetMixFormat()
                .map_err(|e| CaptureError::ConfigurationFailed(format!("GetMixFormat failed: {}", e)))?;
            if ptr.is_null() {
                return Err(CaptureError::ConfigurationFailed("GetMixFormat returned null".into()));
            }
            Ok(Self {
                descriptor: FormatDescriptor::read(ptr),
                ptr,
            })
        }
    }

    pub fn as_ptr(&self) -> *const WAVEFORMATEX {
        self.ptr
    }

    pub fn descriptor(&self) -> &FormatDescriptor {
        &self.descriptor
    }
}

impl Drop for MixFormat {
    fn drop(&mut self) {
        unsafe { CoTaskMemFree(Some(self.ptr as *const _)) };
    }
}
