//! CoreAudio capture through a HAL IO proc.
//!
//! One stream type serves both directions. Input devices get the IO proc
//! installed directly. Output devices and the system sentinel go through a
//! [`ProcessTap`], whose aggregate device is captured instead.
//!
//! CoreAudio owns the IO thread. The IO proc only copies each native buffer
//! into a bounded queue; the engine's capture thread waits on that queue the
//! same way the WASAPI stream waits on its event, and runs the conversion
//! itself.

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use objc2_core_audio::*;
use objc2_core_audio_types::{AudioBuffer, AudioBufferList, AudioTimeStamp};

use native_audio_core::models::device::{DeviceType, SYSTEM_AUDIO_DEVICE_ID};
use native_audio_core::models::error::CaptureError;
use native_audio_core::processing::sample_converter::NativeFormat;
use native_audio_core::traits::capture_backend::{
    CaptureBackend, CaptureRequest, CaptureStream, DrainControl, NativePacket, WaitOutcome,
};

use crate::device_enumerator;
use crate::format::StreamDescription;
use crate::hal;
use crate::process_tap::ProcessTap;

/// Native buffers held between the IO proc and the capture thread.
const PACKET_QUEUE_CAPACITY: usize = 128;

#[derive(Debug)]
struct RawPacket {
    data: Vec<u8>,
    frames: usize,
}

/// How the IO proc turns an `AudioBufferList` into one interleaved packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BufferLayout {
    channels: usize,
    bytes_per_sample: usize,
    interleaved: bool,
}

impl BufferLayout {
    fn new(description: &StreamDescription) -> Self {
        Self {
            channels: description.channels.max(1) as usize,
            bytes_per_sample: description.bytes_per_sample().max(1),
            interleaved: description.is_interleaved(),
        }
    }

    /// Interleaved copy of one callback's buffers. Interleaved layouts use
    /// the first buffer; planar layouts take one buffer per channel.
    fn packet(&self, buffers: &[&[u8]]) -> Option<RawPacket> {
        if self.interleaved {
            let data = *buffers.first()?;
            let frames = data.len() / (self.bytes_per_sample * self.channels);
            if frames == 0 {
                return None;
            }
            return Some(RawPacket {
                data: data[..frames * self.bytes_per_sample * self.channels].to_vec(),
                frames,
            });
        }

        let planes = buffers.get(..self.channels)?;
        let frames = planes.iter().map(|p| p.len() / self.bytes_per_sample).min()?;
        if frames == 0 {
            return None;
        }
        let mut data = Vec::with_capacity(frames * self.channels * self.bytes_per_sample);
        for frame in 0..frames {
            let offset = frame * self.bytes_per_sample;
            for plane in planes {
                data.extend_from_slice(&plane[offset..offset + self.bytes_per_sample]);
            }
        }
        Some(RawPacket { data, frames })
    }
}

/// State the IO proc reads through its client-data pointer.
struct IoContext {
    packets: Sender<RawPacket>,
    overflows: AtomicUsize,
    layout: BufferLayout,
}

/// Runs on the CoreAudio IO thread: copy and enqueue, nothing else.
unsafe extern "C-unwind" fn io_proc(
    _device: AudioObjectID,
    _now: NonNull<AudioTimeStamp>,
    input_data: NonNull<AudioBufferList>,
    _input_time: NonNull<AudioTimeStamp>,
    _output_data: NonNull<AudioBufferList>,
    _output_time: NonNull<AudioTimeStamp>,
    client_data: *mut c_void,
) -> i32 {
    if client_data.is_null() {
        return 0;
    }
    let context = &*(client_data as *const IoContext);
    let list = input_data.as_ref();
    let buffers_ptr: *const AudioBuffer = list.mBuffers.as_ptr();

    let mut buffers: Vec<&[u8]> = Vec::with_capacity(list.mNumberBuffers as usize);
    for i in 0..list.mNumberBuffers as usize {
        let buffer = &*buffers_ptr.add(i);
        if buffer.mData.is_null() || buffer.mDataByteSize == 0 {
            buffers.push(&[]);
        } else {
            buffers.push(std::slice::from_raw_parts(
                buffer.mData as *const u8,
                buffer.mDataByteSize as usize,
            ));
        }
    }

    if let Some(packet) = context.layout.packet(&buffers) {
        if let Err(TrySendError::Full(_)) = context.packets.try_send(packet) {
            context.overflows.fetch_add(1, Ordering::Relaxed);
        }
    }
    0
}

/// Recipe for a CoreAudio capture stream; opened on the capture thread.
#[derive(Debug, Clone)]
pub struct CoreAudioBackend {
    device_type: DeviceType,
    device_id: String,
}

impl CoreAudioBackend {
    pub fn new(request: &CaptureRequest) -> Self {
        Self {
            device_type: request.device_type,
            device_id: request.device_id.clone(),
        }
    }

    /// Loopback on output devices, including the system sentinel.
    pub fn is_loopback(&self) -> bool {
        self.device_type.is_loopback() || self.device_id == SYSTEM_AUDIO_DEVICE_ID
    }

    fn open_input(&self) -> Result<CoreAudioStream, CaptureError> {
        let device = device_enumerator::resolve(DeviceType::Input, &self.device_id)?;
        let description = hal::stream_description(device, DeviceType::Input).ok_or_else(|| {
            CaptureError::ConfigurationFailed(format!("input device {} reports no stream format", device))
        })?;
        CoreAudioStream::create(device, description, None)
    }

    fn open_loopback(&self) -> Result<CoreAudioStream, CaptureError> {
        let output = device_enumerator::resolve(DeviceType::Output, &self.device_id)?;
        let output_uid = hal::device_uid(output).ok_or_else(|| {
            CaptureError::DeviceNotAvailable(format!("output device {} has no UID", output))
        })?;
        let tap = ProcessTap::create(&output_uid)?;
        CoreAudioStream::create(tap.device(), tap.description(), Some(tap))
    }
}

impl CaptureBackend for CoreAudioBackend {
    type Stream = CoreAudioStream;

    fn open(self) -> Result<CoreAudioStream, CaptureError> {
        let stream = if self.is_loopback() {
            self.open_loopback()?
        } else {
            self.open_input()?
        };

        log::debug!(
            "coreaudio: opened {} {:?} ({} Hz, {} ch, {:?}, loopback={})",
            self.device_type,
            self.device_id,
            stream.format.sample_rate,
            stream.format.channels,
            stream.format.encoding,
            self.is_loopback()
        );
        Ok(stream)
    }
}

/// An IO proc installed on a device plus the queue it feeds.
///
/// `Drop` destroys the IO proc before the tap and the context it points to
/// are released.
pub struct CoreAudioStream {
    device: AudioObjectID,
    proc_id: AudioDeviceIOProcID,
    started: bool,
    format: NativeFormat,
    packets: Receiver<RawPacket>,
    pending: Option<RawPacket>,
    context: Box<IoContext>,
    tap: Option<ProcessTap>,
}

impl CoreAudioStream {
    fn create(
        device: AudioObjectID,
        description: StreamDescription,
        tap: Option<ProcessTap>,
    ) -> Result<Self, CaptureError> {
        let (packet_tx, packets) = bounded(PACKET_QUEUE_CAPACITY);
        let context = Box::new(IoContext {
            packets: packet_tx,
            overflows: AtomicUsize::new(0),
            layout: BufferLayout::new(&description),
        });
        let client_data = &*context as *const IoContext as *mut c_void;

        let mut proc_id: AudioDeviceIOProcID = None;
        let status = unsafe {
            AudioDeviceCreateIOProcID(device, Some(io_proc), client_data, NonNull::from(&mut proc_id))
        };
        hal::check(status, "AudioDeviceCreateIOProcID")?;

        Ok(Self {
            device,
            proc_id,
            started: false,
            format: description.native_format(),
            packets,
            pending: None,
            context,
            tap,
        })
    }
}

impl CaptureStream for CoreAudioStream {
    fn format(&self) -> NativeFormat {
        self.format
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        let status = unsafe { AudioDeviceStart(self.device, self.proc_id) };
        hal::check(status, "AudioDeviceStart")?;
        self.started = true;
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome, CaptureError> {
        if self.pending.is_some() {
            return Ok(WaitOutcome::Ready);
        }
        match self.packets.recv_timeout(timeout) {
            Ok(packet) => {
                self.pending = Some(packet);
                Ok(WaitOutcome::Ready)
            }
            // A removed device stops calling the IO proc without an error.
            Err(RecvTimeoutError::Timeout) if !hal::is_alive(self.device) => Err(CaptureError::StreamFailed(
                format!("device {} is no longer available", self.device),
            )),
            Err(RecvTimeoutError::Timeout) => Ok(WaitOutcome::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::StreamFailed("stream closed".into())),
        }
    }

    fn drain(
        &mut self,
        on_packet: &mut dyn FnMut(NativePacket<'_>) -> DrainControl,
    ) -> Result<usize, CaptureError> {
        let mut drained = 0;
        while let Some(packet) = self.pending.take().or_else(|| self.packets.try_recv().ok()) {
            let control = on_packet(NativePacket {
                data: &packet.data,
                frames: packet.frames,
                silent: false,
            });
            drained += 1;
            if control == DrainControl::Stop {
                break;
            }
        }
        Ok(drained)
    }

    fn stop(&mut self) {
        if self.started {
            let status = unsafe { AudioDeviceStop(self.device, self.proc_id) };
            if status != 0 {
                log::warn!("coreaudio: AudioDeviceStop failed: OSStatus {}", status);
            }
            self.started = false;
        }
        let overflows = self.context.overflows.swap(0, Ordering::Relaxed);
        if overflows > 0 {
            log::warn!("coreaudio: {} native buffers dropped on a full queue", overflows);
        }
    }
}

impl Drop for CoreAudioStream {
    fn drop(&mut self) {
        self.stop();
        let status = unsafe { AudioDeviceDestroyIOProcID(self.device, self.proc_id) };
        if status != 0 {
            log::warn!("coreaudio: AudioDeviceDestroyIOProcID failed: OSStatus {}", status);
        }
        // The tap outlives the IO proc that reads its aggregate device.
        drop(self.tap.take());
    }
}
