//! Scripted in-memory platform for exercising engines without audio
//! hardware. Enabled by the `test-util` feature.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::device::{
    AudioDevice, AudioFormat, DeviceType, PermissionKind, PermissionStatus, SYSTEM_AUDIO_DEVICE_ID,
};
use crate::models::error::CaptureError;
use crate::processing::sample_converter::{NativeFormat, SampleEncoding};
use crate::traits::audio_platform::AudioPlatform;
use crate::traits::capture_backend::{
    CaptureBackend, CaptureRequest, CaptureStream, DrainControl, NativePacket, WaitOutcome,
};

pub const MOCK_MIC_ID: &str = "mock-mic";
pub const MOCK_SPEAKER_ID: &str = "mock-speaker";

/// Counters shared between a mock platform and every stream it opens.
#[derive(Debug, Clone, Default)]
pub struct MockStats {
    opens: Arc<AtomicUsize>,
    streams_alive: Arc<AtomicUsize>,
    stream_stops: Arc<AtomicUsize>,
    permission_requests: Arc<AtomicUsize>,
    mic_checks: Arc<AtomicUsize>,
    system_checks: Arc<AtomicUsize>,
}

impl MockStats {
    /// Times a backend tried to open a stream.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Streams opened and not yet dropped.
    pub fn streams_alive(&self) -> usize {
        self.streams_alive.load(Ordering::SeqCst)
    }

    pub fn stream_stops(&self) -> usize {
        self.stream_stops.load(Ordering::SeqCst)
    }

    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }

    /// Times a capability was read, directly or as part of a full check.
    pub fn permission_checks(&self, kind: PermissionKind) -> usize {
        self.checks(kind).load(Ordering::SeqCst)
    }

    fn checks(&self, kind: PermissionKind) -> &AtomicUsize {
        match kind {
            PermissionKind::Mic => &self.mic_checks,
            PermissionKind::System => &self.system_checks,
        }
    }
}

/// What a mock stream produces.
#[derive(Debug, Clone)]
pub struct MockScript {
    pub format: NativeFormat,
    pub packet: Vec<u8>,
    pub frames: usize,
    pub silent: bool,
    pub interval: Duration,
    /// A new packet is pending every `interval` while draining, so a drain
    /// only ends when the callback stops it.
    pub continuous: bool,
    pub fail_open: Option<CaptureError>,
    pub fail_after_packets: Option<usize>,
}

impl MockScript {
    /// 48 kHz float packets of a constant half-scale signal.
    pub fn float_tone(channels: u16, frames: usize) -> Self {
        let packet = std::iter::repeat(0.5f32.to_le_bytes())
            .take(frames * channels as usize)
            .flatten()
            .collect();
        Self {
            format: NativeFormat {
                sample_rate: 48000,
                channels,
                encoding: SampleEncoding::Float32,
            },
            packet,
            frames,
            silent: false,
            interval: Duration::from_millis(5),
            continuous: false,
            fail_open: None,
            fail_after_packets: None,
        }
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn continuous(mut self) -> Self {
        self.continuous = true;
        self
    }

    pub fn fail_open(mut self, error: CaptureError) -> Self {
        self.fail_open = Some(error);
        self
    }

    pub fn fail_after_packets(mut self, packets: usize) -> Self {
        self.fail_after_packets = Some(packets);
        self
    }
}

/// Backend that opens a [`MockStream`] following its script.
#[derive(Debug)]
pub struct MockBackend {
    script: MockScript,
    stats: MockStats,
}

impl MockBackend {
    pub fn new(script: MockScript, stats: MockStats) -> Self {
        Self { script, stats }
    }
}

impl CaptureBackend for MockBackend {
    type Stream = MockStream;

    fn open(self) -> Result<MockStream, CaptureError> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.script.fail_open {
            return Err(error);
        }
        self.stats.streams_alive.fetch_add(1, Ordering::SeqCst);
        Ok(MockStream {
            script: self.script,
            stats: self.stats,
            delivered: 0,
            next_due: None,
        })
    }
}

/// Stream that becomes ready every `script.interval`.
#[derive(Debug)]
pub struct MockStream {
    script: MockScript,
    stats: MockStats,
    delivered: usize,
    next_due: Option<Instant>,
}

impl CaptureStream for MockStream {
    fn format(&self) -> NativeFormat {
        self.script.format
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.next_due = Some(Instant::now() + self.script.interval);
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome, CaptureError> {
        let due = self
            .next_due
            .ok_or_else(|| CaptureError::StreamFailed("stream not started".into()))?;
        let now = Instant::now();
        let deadline = now + timeout;
        if due > now {
            thread::sleep(due.min(deadline) - now);
        }
        if Instant::now() >= due {
            self.next_due = Some(due + self.script.interval);
            Ok(WaitOutcome::Ready)
        } else {
            Ok(WaitOutcome::TimedOut)
        }
    }

    fn drain(
        &mut self,
        on_packet: &mut dyn FnMut(NativePacket<'_>) -> DrainControl,
    ) -> Result<usize, CaptureError> {
        let mut drained = 0;
        loop {
            if let Some(limit) = self.script.fail_after_packets {
                if self.delivered >= limit {
                    return Err(CaptureError::StreamFailed("GetBuffer failed: mock".into()));
                }
            }
            let control = on_packet(NativePacket {
                data: &self.script.packet,
                frames: self.script.frames,
                silent: self.script.silent,
            });
            self.delivered += 1;
            drained += 1;

            if !self.script.continuous || control == DrainControl::Stop {
                return Ok(drained);
            }
            thread::sleep(self.script.interval);
        }
    }

    fn stop(&mut self) {
        self.stats.stream_stops.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.stats.streams_alive.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Platform with one default microphone and one default speaker.
#[derive(Debug, Clone)]
pub struct MockPlatform {
    devices: Vec<AudioDevice>,
    formats: HashMap<String, AudioFormat>,
    permission: PermissionStatus,
    grant_on_request: bool,
    script: MockScript,
    stats: MockStats,
}

impl MockPlatform {
    pub fn new() -> Self {
        let devices = vec![
            AudioDevice {
                id: MOCK_MIC_ID.into(),
                name: "Mock Microphone".into(),
                device_type: DeviceType::Input,
                is_default: true,
            },
            AudioDevice {
                id: MOCK_SPEAKER_ID.into(),
                name: "Mock Speakers".into(),
                device_type: DeviceType::Output,
                is_default: true,
            },
        ];
        let mut formats = HashMap::new();
        formats.insert(MOCK_MIC_ID.to_string(), AudioFormat::new(48000, 1, 24));
        formats.insert(MOCK_SPEAKER_ID.to_string(), AudioFormat::new(48000, 2, 32));

        Self {
            devices,
            formats,
            permission: PermissionStatus::granted(),
            grant_on_request: true,
            script: MockScript::float_tone(2, 480),
            stats: MockStats::default(),
        }
    }

    pub fn with_script(mut self, script: MockScript) -> Self {
        self.script = script;
        self
    }

    pub fn with_permission(mut self, permission: PermissionStatus, grant_on_request: bool) -> Self {
        self.permission = permission;
        self.grant_on_request = grant_on_request;
        self
    }

    pub fn stats(&self) -> MockStats {
        self.stats.clone()
    }

    fn resolve(&self, device_type: DeviceType, device_id: &str) -> Option<&AudioDevice> {
        if device_id.is_empty() || device_id == SYSTEM_AUDIO_DEVICE_ID {
            let direction = if device_id == SYSTEM_AUDIO_DEVICE_ID {
                DeviceType::Output
            } else {
                device_type
            };
            return self
                .devices
                .iter()
                .find(|d| d.device_type == direction && d.is_default);
        }
        self.devices.iter().find(|d| d.id == device_id)
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioPlatform for MockPlatform {
    type Backend = MockBackend;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn devices(&self) -> Vec<AudioDevice> {
        self.devices.clone()
    }

    fn device_format(&self, device_id: &str) -> AudioFormat {
        self.resolve(DeviceType::Input, device_id)
            .and_then(|d| self.formats.get(&d.id).copied())
            .unwrap_or_else(AudioFormat::unavailable)
    }

    fn check_permission(&self) -> PermissionStatus {
        self.stats.checks(PermissionKind::Mic).fetch_add(1, Ordering::SeqCst);
        self.stats.checks(PermissionKind::System).fetch_add(1, Ordering::SeqCst);
        self.permission
    }

    fn is_permitted(&self, kind: PermissionKind) -> bool {
        self.stats.checks(kind).fetch_add(1, Ordering::SeqCst);
        self.permission.allows(kind)
    }

    fn request_permission(&self, kind: PermissionKind) -> bool {
        self.stats.permission_requests.fetch_add(1, Ordering::SeqCst);
        self.permission.allows(kind) || self.grant_on_request
    }

    fn backend(&self, request: &CaptureRequest) -> Result<MockBackend, CaptureError> {
        let mut script = self.script.clone();
        if script.fail_open.is_none() && self.resolve(request.device_type, &request.device_id).is_none() {
            // Unknown endpoints fail on the capture thread, like a real backend.
            script.fail_open = Some(CaptureError::DeviceNotAvailable(request.device_id.clone()));
        }
        Ok(MockBackend::new(script, self.stats.clone()))
    }
}
