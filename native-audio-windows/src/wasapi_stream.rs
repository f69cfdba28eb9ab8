//! Event-driven WASAPI capture stream.
//!
//! One stream type serves both directions: capture endpoints are opened
//! directly, render endpoints are opened with `AUDCLNT_STREAMFLAGS_LOOPBACK`
//! to record the mix going to them. No special permissions are needed for
//! loopback on Windows; DRM-protected audio is silenced by the OS.
//!
//! Sequence (all on the capture thread):
//! 1. CoInitializeEx (MTA)
//! 2. Resolve the endpoint (empty id / system sentinel → default)
//! 3. Activate IAudioClient, read the mix format
//! 4. Initialize shared mode with EVENTCALLBACK (| LOOPBACK for output)
//! 5. SetEventHandle, get IAudioCaptureClient
//! 6. Register with MMCSS, Start
//! 7. Wait on the event, drain packets until stopped

use std::time::Duration;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::CLSCTX_ALL;
use windows::Win32::System::Threading::*;

use native_audio_core::models::device::{DeviceType, SYSTEM_AUDIO_DEVICE_ID};
use native_audio_core::models::error::CaptureError;
use native_audio_core::processing::sample_converter::NativeFormat;
use native_audio_core::traits::capture_backend::{
    CaptureBackend, CaptureRequest, CaptureStream, DrainControl, NativePacket, WaitOutcome,
};

use crate::com::ComGuard;
use crate::device_enumerator::DeviceEnumerator;
use crate::format::MixFormat;

/// 100-ns units per millisecond (REFERENCE_TIME).
const HNS_PER_MS: i64 = 10_000;

/// Recipe for a WASAPI capture stream; opened on the capture thread.
#[derive(Debug, Clone)]
pub struct WasapiBackend {
    device_type: DeviceType,
    device_id: String,
    buffer_duration_ms: u64,
}

impl WasapiBackend {
    pub fn new(request: &CaptureRequest) -> Self {
        Self {
            device_type: request.device_type,
            device_id: request.device_id.clone(),
            buffer_duration_ms: request.config.buffer_duration_ms,
        }
    }

    /// Loopback on render endpoints, including the system sentinel.
    pub fn is_loopback(&self) -> bool {
        self.device_type.is_loopback() || self.device_id == SYSTEM_AUDIO_DEVICE_ID
    }
}

impl CaptureBackend for WasapiBackend {
    type Stream = WasapiStream;

    fn open(self) -> Result<WasapiStream, CaptureError> {
        let com = ComGuard::init()?;
        let loopback = self.is_loopback();
        let enumerator = DeviceEnumerator::new()?;
        let device_type = if loopback { DeviceType::Output } else { DeviceType::Input };
        let device = enumerator.resolve(device_type, &self.device_id)?;

        unsafe {
            let audio_client: IAudioClient = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| CaptureError::ConfigurationFailed(format!("Activate failed: {}", e)))?;

            let mix_format = MixFormat::query(&audio_client)?;

            let mut stream_flags = AUDCLNT_STREAMFLAGS_EVENTCALLBACK;
            if loopback {
                stream_flags |= AUDCLNT_STREAMFLAGS_LOOPBACK;
            }

            audio_client
                .Initialize(
                    AUDCLNT_SHAREMODE_SHARED,
                    stream_flags,
                    self.buffer_duration_ms as i64 * HNS_PER_MS,
                    0,
                    mix_format.as_ptr(),
                    None,
                )
                .map_err(|e| CaptureError::ConfigurationFailed(format!("IAudioClient::Initialize failed: {}", e)))?;

            let event = CreateEventW(None, false, false, PCWSTR::null())
                .map_err(|e| CaptureError::ConfigurationFailed(format!("CreateEventW failed: {}", e)))?;
            let event = EventHandle(event);

            audio_client
                .SetEventHandle(event.0)
                .map_err(|e| CaptureError::ConfigurationFailed(format!("SetEventHandle failed: {}", e)))?;

            let capture_client: IAudioCaptureClient = audio_client
                .GetService()
                .map_err(|e| CaptureError::ConfigurationFailed(format!("GetService failed: {}", e)))?;

            let descriptor = *mix_format.descriptor();
            log::debug!(
                "wasapi: opened {} endpoint {:?} ({} Hz, {} ch, {} bit, loopback={})",
                device_type,
                self.device_id,
                descriptor.sample_rate,
                descriptor.channels,
                descriptor.raw_bit_depth(),
                loopback
            );

            Ok(WasapiStream {
                format: descriptor.native_format(),
                block_align: usize::from(descriptor.block_align),
                mmcss: None,
                started: false,
                capture_client,
                audio_client,
                event,
                _mix_format: mix_format,
                _com: com,
            })
        }
    }
}

/// Auto-reset event signalled by WASAPI when a buffer is ready.
struct EventHandle(HANDLE);

impl Drop for EventHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// An initialized WASAPI capture client bound to the capture thread.
///
/// Field order is drop order: COM interfaces are released before the
/// apartment is left.
pub struct WasapiStream {
    format: NativeFormat,
    block_align: usize,
    mmcss: Option<HANDLE>,
    started: bool,
    capture_client: IAudioCaptureClient,
    audio_client: IAudioClient,
    event: EventHandle,
    _mix_format: MixFormat,
    _com: ComGuard,
}

impl CaptureStream for WasapiStream {
    fn format(&self) -> NativeFormat {
        self.format
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        unsafe {
            // MMCSS registration for real-time priority; optional.
            let mut task_index: u32 = 0;
            let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
            match AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index) {
                Ok(handle) => self.mmcss = Some(handle),
                Err(e) => log::debug!("wasapi: MMCSS registration failed: {}", e),
            }

            self.audio_client
                .Start()
                .map_err(|e| CaptureError::ConfigurationFailed(format!("IAudioClient::Start failed: {}", e)))?;
        }
        self.started = true;
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome, CaptureError> {
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let result = unsafe { WaitForSingleObject(self.event.0, timeout_ms) };
        if result == WAIT_OBJECT_0 {
            Ok(WaitOutcome::Ready)
        } else if result == WAIT_TIMEOUT {
            Ok(WaitOutcome::TimedOut)
        } else {
            Err(CaptureError::StreamFailed(format!(
                "WaitForSingleObject failed: 0x{:08X}",
                result.0
            )))
        }
    }

    fn drain(
        &mut self,
        on_packet: &mut dyn FnMut(NativePacket<'_>) -> DrainControl,
    ) -> Result<usize, CaptureError> {
        let mut drained = 0;
        unsafe {
            let mut packet_length = self
                .capture_client
                .GetNextPacketSize()
                .map_err(|e| CaptureError::StreamFailed(format!("GetNextPacketSize failed: {}", e)))?;

            while packet_length > 0 {
                let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
                let mut num_frames: u32 = 0;
                let mut flags: u32 = 0;

                self.capture_client
                    .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                    .map_err(|e| CaptureError::StreamFailed(format!("GetBuffer failed: {}", e)))?;

                let silent = flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0;
                let frames = num_frames as usize;
                let data: &[u8] = if silent || buffer_ptr.is_null() || frames == 0 {
                    &[]
                } else {
                    std::slice::from_raw_parts(buffer_ptr, frames * self.block_align)
                };

                let mut control = DrainControl::Continue;
                if frames > 0 {
                    control = on_packet(NativePacket {
                        data,
                        frames,
                        silent: silent || buffer_ptr.is_null(),
                    });
                    drained += 1;
                }

                self.capture_client
                    .ReleaseBuffer(num_frames)
                    .map_err(|e| CaptureError::StreamFailed(format!("ReleaseBuffer failed: {}", e)))?;

                if control == DrainControl::Stop {
                    break;
                }

                packet_length = self
                    .capture_client
                    .GetNextPacketSize()
                    .map_err(|e| CaptureError::StreamFailed(format!("GetNextPacketSize failed: {}", e)))?;
            }
        }
        Ok(drained)
    }

    fn stop(&mut self) {
        unsafe {
            if self.started {
                if let Err(e) = self.audio_client.Stop() {
                    log::warn!("wasapi: IAudioClient::Stop failed: {}", e);
                }
                self.started = false;
            }
            if let Some(handle) = self.mmcss.take() {
                let _ = AvRevertMmThreadCharacteristics(handle);
            }
        }
    }
}

impl Drop for WasapiStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use native_audio_core::models::config::EngineConfig;

    fn request(device_type: DeviceType, device_id: &str) -> CaptureRequest {
        CaptureRequest {
            device_type,
            device_id: device_id.into(),
            config: EngineConfig::default(),
        }
    }

    #[test]
    fn sentinel_and_output_use_loopback() {
        assert!(WasapiBackend::new(&request(DeviceType::Output, "")).is_loopback());
        assert!(WasapiBackend::new(&request(DeviceType::Input, SYSTEM_AUDIO_DEVICE_ID)).is_loopback());
        assert!(!WasapiBackend::new(&request(DeviceType::Input, "")).is_loopback());
    }

    #[test]
    fn unknown_endpoint_fails_to_open() {
        let result = WasapiBackend::new(&request(DeviceType::Input, "{missing-endpoint}")).open();
        assert!(matches!(result, Err(CaptureError::DeviceNotAvailable(_))));
    }
}
