//! Mapping between CoreAudio stream descriptions and the core formats.

use objc2_core_audio_types::AudioStreamBasicDescription;

use native_audio_core::models::device::AudioFormat;
use native_audio_core::processing::sample_converter::{NativeFormat, SampleEncoding};

/// kAudioFormatLinearPCM ('lpcm')
const FORMAT_LINEAR_PCM: u32 = 0x6C70_636D;

const FLAG_IS_FLOAT: u32 = 1 << 0;
const FLAG_IS_BIG_ENDIAN: u32 = 1 << 1;
const FLAG_IS_SIGNED_INTEGER: u32 = 1 << 2;
const FLAG_IS_ALIGNED_HIGH: u32 = 1 << 4;
const FLAG_IS_NON_INTERLEAVED: u32 = 1 << 5;

/// Fields of an `AudioStreamBasicDescription` the engine cares about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamDescription {
    pub sample_rate: f64,
    pub format_id: u32,
    pub flags: u32,
    pub bytes_per_frame: u32,
    pub channels: u32,
    pub bits_per_channel: u32,
}

impl StreamDescription {
    pub fn from_asbd(asbd: &AudioStreamBasicDescription) -> Self {
        Self {
            sample_rate: asbd.mSampleRate,
            format_id: asbd.mFormatID,
            flags: asbd.mFormatFlags,
            bytes_per_frame: asbd.mBytesPerFrame,
            channels: asbd.mChannelsPerFrame,
            bits_per_channel: asbd.mBitsPerChannel,
        }
    }

    /// Interleaved 32-bit float, the layout of process taps.
    pub fn float32(sample_rate: f64, channels: u32) -> Self {
        Self {
            sample_rate,
            format_id: FORMAT_LINEAR_PCM,
            flags: FLAG_IS_FLOAT,
            bytes_per_frame: 4 * channels,
            channels,
            bits_per_channel: 32,
        }
    }

    /// Samples of all channels share one buffer.
    pub fn is_interleaved(&self) -> bool {
        self.flags & FLAG_IS_NON_INTERLEAVED == 0
    }

    /// Bytes one sample occupies, derived from the frame size.
    pub fn bytes_per_sample(&self) -> usize {
        let frame = self.bytes_per_frame as usize;
        if self.is_interleaved() {
            frame / (self.channels.max(1) as usize)
        } else {
            frame
        }
    }

    /// Sample encoding by container width and flags. Big-endian, unsigned,
    /// and low-aligned layouts are not decoded.
    pub fn encoding(&self) -> SampleEncoding {
        let bits = self.bits_per_channel as u16;
        let container = (self.bytes_per_sample() * 8) as u16;

        if self.format_id != FORMAT_LINEAR_PCM || self.flags & FLAG_IS_BIG_ENDIAN != 0 {
            return SampleEncoding::Unsupported { bits };
        }
        if self.flags & FLAG_IS_FLOAT != 0 {
            return SampleEncoding::from_float_bits(container);
        }
        if self.flags & FLAG_IS_SIGNED_INTEGER == 0 {
            return SampleEncoding::Unsupported { bits };
        }
        if container != bits && self.flags & FLAG_IS_ALIGNED_HIGH == 0 {
            return SampleEncoding::Unsupported { bits };
        }
        SampleEncoding::from_pcm_bits(container)
    }

    pub fn native_format(&self) -> NativeFormat {
        NativeFormat {
            sample_rate: self.sample_rate.round() as u32,
            channels: self.channels as u16,
            encoding: self.encoding(),
        }
    }

    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat::new(
            self.sample_rate.round() as u32,
            self.channels as u16,
            self.bits_per_channel as u16,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integer(bits: u32, container_bytes: u32, flags: u32) -> StreamDescription {
        StreamDescription {
            sample_rate: 44100.0,
            format_id: FORMAT_LINEAR_PCM,
            flags: FLAG_IS_SIGNED_INTEGER | flags,
            bytes_per_frame: container_bytes * 2,
            channels: 2,
            bits_per_channel: bits,
        }
    }

    #[test]
    fn tap_layout_is_float32() {
        let description = StreamDescription::float32(48000.0, 2);
        assert!(description.is_interleaved());
        assert_eq!(description.encoding(), SampleEncoding::Float32);
        assert_eq!(description.audio_format(), AudioFormat::new(48000, 2, 32));
    }

    #[test]
    fn packed_and_high_aligned_integers() {
        assert_eq!(integer(16, 2, 0).encoding(), SampleEncoding::Int16);
        assert_eq!(integer(24, 3, 0).encoding(), SampleEncoding::Int24);
        assert_eq!(integer(24, 4, FLAG_IS_ALIGNED_HIGH).encoding(), SampleEncoding::Int32);
        assert_eq!(integer(24, 4, 0).encoding(), SampleEncoding::Unsupported { bits: 24 });
    }

    #[test]
    fn layouts_that_degrade_to_silence() {
        let unsigned = StreamDescription {
            flags: 0,
            ..integer(8, 1, 0)
        };
        assert_eq!(unsigned.encoding(), SampleEncoding::Unsupported { bits: 8 });
        assert_eq!(
            integer(16, 2, FLAG_IS_BIG_ENDIAN).encoding(),
            SampleEncoding::Unsupported { bits: 16 }
        );

        let double = StreamDescription {
            bits_per_channel: 64,
            bytes_per_frame: 16,
            ..StreamDescription::float32(48000.0, 2)
        };
        assert_eq!(double.encoding(), SampleEncoding::Unsupported { bits: 64 });
    }

    #[test]
    fn non_interleaved_frame_size_is_one_sample() {
        let description = StreamDescription {
            flags: FLAG_IS_FLOAT | FLAG_IS_NON_INTERLEAVED,
            bytes_per_frame: 4,
            ..StreamDescription::float32(48000.0, 2)
        };
        assert!(!description.is_interleaved());
        assert_eq!(description.bytes_per_sample(), 4);
        assert_eq!(description.native_format().channels, 2);
        assert_eq!(description.encoding(), SampleEncoding::Float32);
    }
}
