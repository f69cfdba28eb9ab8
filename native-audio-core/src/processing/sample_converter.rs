//! Native buffer → interleaved little-endian 16-bit PCM.
//!
//! Every supported encoding is first normalized to `f32` in `[-1.0, 1.0]`,
//! then clipped and scaled by `i16::MAX`. Frame count in equals frame count
//! out; nothing here resamples.

/// Divisor for 16-bit integer samples.
const PCM_16BIT_SCALE: f32 = 32768.0;

/// Divisor for 32-bit integer samples (and 24-bit samples shifted into the
/// high bits of a 32-bit word).
const PCM_32BIT_SCALE: f32 = 2147483648.0;

/// Native sample encoding of a capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// Signed 16-bit little-endian integers.
    Int16,
    /// Signed 24-bit little-endian integers packed in 3 bytes.
    Int24,
    /// Signed 32-bit little-endian integers.
    Int32,
    /// IEEE 754 32-bit float.
    Float32,
    /// Anything else; converted to silence.
    Unsupported { bits: u16 },
}

impl SampleEncoding {
    /// Bytes occupied by one sample in the native buffer.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::Int16 => 2,
            Self::Int24 => 3,
            Self::Int32 | Self::Float32 => 4,
            Self::Unsupported { bits } => (*bits as usize).div_ceil(8),
        }
    }

    /// Native bit width, as reported in `AudioFormat::raw_bit_depth`.
    pub fn bits(&self) -> u16 {
        match self {
            Self::Int16 => 16,
            Self::Int24 => 24,
            Self::Int32 | Self::Float32 => 32,
            Self::Unsupported { bits } => *bits,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported { .. })
    }

    /// Map an integer PCM container width to an encoding. 8-bit PCM is
    /// not decoded.
    pub fn from_pcm_bits(bits: u16) -> Self {
        match bits {
            16 => Self::Int16,
            24 => Self::Int24,
            32 => Self::Int32,
            other => Self::Unsupported { bits: other },
        }
    }

    /// Map an IEEE float container width to an encoding.
    pub fn from_float_bits(bits: u16) -> Self {
        match bits {
            32 => Self::Float32,
            other => Self::Unsupported { bits: other },
        }
    }
}

/// The format a backend stream actually delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl NativeFormat {
    /// Size of one interleaved frame in the native buffer.
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.encoding.bytes_per_sample()
    }
}

/// Convert one native buffer of `frames` frames into 16-bit PCM bytes.
///
/// `silent` mirrors the backend's silence flag: the native bytes are not
/// read at all and zeros are emitted. Unsupported encodings also produce
/// zeros. A native buffer shorter than `frames` frames is zero-padded.
pub fn convert_to_pcm16(data: &[u8], frames: usize, format: &NativeFormat, silent: bool) -> Vec<u8> {
    let sample_count = frames * format.channels as usize;

    if silent || !format.encoding.is_supported() {
        return vec![0u8; sample_count * 2];
    }

    // Already in the output encoding; copy through untouched.
    if format.encoding == SampleEncoding::Int16 {
        let mut out = vec![0u8; sample_count * 2];
        let available = data.len().min(out.len()) & !1;
        out[..available].copy_from_slice(&data[..available]);
        return out;
    }

    let normalized = normalize(data, sample_count, format.encoding);
    float_to_pcm16(&normalized)
}

/// Decode native samples into `f32`, zero-filling past the end of `data`.
pub fn normalize(data: &[u8], sample_count: usize, encoding: SampleEncoding) -> Vec<f32> {
    let width = encoding.bytes_per_sample();
    let mut samples = vec![0.0f32; sample_count];
    if width == 0 {
        return samples;
    }

    for (sample, bytes) in samples.iter_mut().zip(data.chunks_exact(width)) {
        *sample = match encoding {
            SampleEncoding::Int16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / PCM_16BIT_SCALE,
            SampleEncoding::Int24 => {
                // Place the 3 bytes in the high 24 bits so the sign extends.
                let word = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]);
                word as f32 / PCM_32BIT_SCALE
            }
            SampleEncoding::Int32 => {
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / PCM_32BIT_SCALE
            }
            SampleEncoding::Float32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            SampleEncoding::Unsupported { .. } => 0.0,
        };
    }
    samples
}

/// Clip `f32` samples to `[-1.0, 1.0]` and scale to little-endian `i16`.
///
/// NaN inputs become 0.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clipped = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
        let value = (clipped * i16::MAX as f32).round() as i16;
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}
