use crate::bridge::callback_bridge::CallbackBridge;
use crate::models::config::EngineConfig;
use crate::models::device::{AudioDevice, AudioFormat, DeviceType, PermissionKind, PermissionStatus};
use crate::models::error::CaptureError;
use crate::models::state::SessionState;
use crate::session::capture_session::CaptureSession;
use crate::traits::audio_engine::AudioEngine;
use crate::traits::audio_platform::AudioPlatform;
use crate::traits::capture_backend::CaptureRequest;

/// Generic engine: one [`AudioPlatform`] plus at most one live
/// [`CaptureSession`].
///
/// ```text
/// start → permission gate → platform.backend() → CaptureSession::spawn
///                                                   └→ [capture thread] → CallbackBridge
/// stop  → CaptureSession::stop (join) → bridge closed
/// ```
pub struct PlatformEngine<P: AudioPlatform> {
    platform: P,
    config: EngineConfig,
    session: Option<CaptureSession>,
}

impl<P: AudioPlatform> PlatformEngine<P> {
    pub fn new(platform: P, config: EngineConfig) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self {
            platform,
            config,
            session: None,
        })
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// The active (or finished but not yet reaped) session.
    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    fn validate_request(&self, device_type: DeviceType, device_id: &str) -> Result<(), CaptureError> {
        if device_id.contains('\0') {
            return Err(CaptureError::InvalidInput("device id contains a NUL byte".into()));
        }
        if self.config.check_permission_on_start {
            let kind = PermissionKind::for_device_type(device_type);
            if !self.platform.is_permitted(kind) {
                return Err(CaptureError::PermissionDenied(kind));
            }
        }
        Ok(())
    }
}

impl<P: AudioPlatform> AudioEngine for PlatformEngine<P> {
    fn start(
        &mut self,
        device_type: DeviceType,
        device_id: &str,
        bridge: CallbackBridge,
    ) -> Result<(), CaptureError> {
        if self.state().is_active() {
            log::debug!("{}: capture already active; ignoring start", self.platform.name());
            return Ok(());
        }

        // A session that ended on its own still holds a joinable handle.
        if let Some(mut finished) = self.session.take() {
            finished.stop();
        }

        self.validate_request(device_type, device_id)?;

        let request = CaptureRequest {
            device_type,
            device_id: device_id.to_string(),
            config: self.config.clone(),
        };
        let backend = self.platform.backend(&request)?;
        self.session = Some(CaptureSession::spawn(backend, &request, bridge)?);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
    }

    fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(CaptureSession::state)
            .unwrap_or_default()
    }

    fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn get_devices(&self) -> Vec<AudioDevice> {
        self.platform.devices()
    }

    fn get_device_format(&self, device_id: &str) -> AudioFormat {
        self.platform.device_format(device_id)
    }

    fn check_permission(&self) -> PermissionStatus {
        self.platform.check_permission()
    }

    fn request_permission(&self, kind: PermissionKind) -> bool {
        log::info!("{}: requesting {} permission", self.platform.name(), kind);
        self.platform.request_permission(kind)
    }
}

impl<P: AudioPlatform> Drop for PlatformEngine<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::callback_bridge::{self, EventDispatcher};
    use crate::testing::{MockPlatform, MockScript, MOCK_MIC_ID, MOCK_SPEAKER_ID};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn fast_config() -> EngineConfig {
        EngineConfig {
            wait_timeout_ms: 20,
            ..EngineConfig::default()
        }
    }

    fn bridge() -> (CallbackBridge, EventDispatcher, Arc<Mutex<usize>>, Arc<Mutex<Vec<String>>>) {
        let chunks = Arc::new(Mutex::new(0usize));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let chunk_sink = Arc::clone(&chunks);
        let error_sink = Arc::clone(&errors);
        let (bridge, dispatcher) = callback_bridge::channel(
            256,
            Duration::from_millis(50),
            Box::new(move |chunk: Vec<u8>| {
                assert!(!chunk.is_empty());
                *chunk_sink.lock() += 1;
            }),
            Box::new(move |message| error_sink.lock().push(message)),
        );
        (bridge, dispatcher, chunks, errors)
    }

    fn wait_for_state(engine: &PlatformEngine<MockPlatform>, state: SessionState) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if engine.state() == state {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn devices_have_ids_and_one_default_per_type() {
        let engine = PlatformEngine::new(MockPlatform::new(), fast_config()).unwrap();
        let devices = engine.get_devices();

        assert!(devices.iter().all(|d| !d.id.is_empty()));
        for device_type in [DeviceType::Input, DeviceType::Output] {
            let defaults = devices
                .iter()
                .filter(|d| d.device_type == device_type && d.is_default)
                .count();
            assert!(defaults <= 1);
        }
    }

    #[test]
    fn device_format_sentinel_for_unknown_id() {
        let engine = PlatformEngine::new(MockPlatform::new(), fast_config()).unwrap();

        assert_eq!(engine.get_device_format("no-such-device").sample_rate, 0);

        let format = engine.get_device_format(MOCK_MIC_ID);
        assert_eq!(format.bit_depth, 16);
        assert_eq!(format.raw_bit_depth, 24);
    }

    #[test]
    fn start_twice_spawns_one_thread() {
        let platform = MockPlatform::new();
        let stats = platform.stats();
        let mut engine = PlatformEngine::new(platform, fast_config()).unwrap();

        let (first, _d1, _c1, _e1) = bridge();
        let (second, _d2, _c2, _e2) = bridge();
        engine.start(DeviceType::Input, MOCK_MIC_ID, first).unwrap();
        assert!(wait_for_state(&engine, SessionState::Running));

        engine.start(DeviceType::Input, MOCK_MIC_ID, second).unwrap();
        assert_eq!(engine.state(), SessionState::Running);
        assert_eq!(stats.opens(), 1);

        engine.stop();
        assert_eq!(engine.state(), SessionState::Idle);
    }

    #[test]
    fn stop_without_start_and_twice() {
        let mut engine = PlatformEngine::new(MockPlatform::new(), fast_config()).unwrap();
        engine.stop();
        engine.stop();
        assert_eq!(engine.state(), SessionState::Idle);

        let (b, _d, _c, _e) = bridge();
        engine.start(DeviceType::Output, MOCK_SPEAKER_ID, b).unwrap();
        engine.stop();
        engine.stop();
        assert_eq!(engine.state(), SessionState::Idle);
    }

    #[test]
    fn end_to_end_default_mic() {
        let platform = MockPlatform::new();
        let stats = platform.stats();
        let mut engine = PlatformEngine::new(platform, fast_config()).unwrap();
        let (b, mut dispatcher, chunks, errors) = bridge();

        engine.start(DeviceType::Input, "", b).unwrap();
        let deadline = Instant::now() + Duration::from_millis(200);
        while Instant::now() < deadline {
            dispatcher.dispatch_timeout(Duration::from_millis(10));
        }
        engine.stop();

        assert_eq!(stats.streams_alive(), 0);
        assert!(*chunks.lock() > 0);
        assert!(errors.lock().is_empty());

        let seen = *chunks.lock();
        dispatcher.dispatch_pending();
        assert_eq!(*chunks.lock(), seen);
    }

    #[test]
    fn unknown_device_fails_on_capture_thread_and_engine_recovers() {
        let mut engine = PlatformEngine::new(MockPlatform::new(), fast_config()).unwrap();
        let (b, mut dispatcher, _chunks, errors) = bridge();

        engine.start(DeviceType::Input, "missing", b).unwrap();
        assert!(wait_for_state(&engine, SessionState::Idle));
        dispatcher.dispatch_timeout(Duration::from_secs(1));
        assert_eq!(errors.lock().len(), 1);

        let (b, _dispatcher, _chunks, _errors) = bridge();
        engine.start(DeviceType::Input, MOCK_MIC_ID, b).unwrap();
        assert!(wait_for_state(&engine, SessionState::Running));
        engine.stop();
    }

    #[test]
    fn steady_state_failure_returns_to_idle() {
        let platform = MockPlatform::new().with_script(MockScript::float_tone(1, 64).fail_after_packets(2));
        let mut engine = PlatformEngine::new(platform, fast_config()).unwrap();
        let (b, mut dispatcher, chunks, errors) = bridge();

        engine.start(DeviceType::Input, MOCK_MIC_ID, b).unwrap();
        assert!(wait_for_state(&engine, SessionState::Idle));
        dispatcher.dispatch_pending();

        assert_eq!(*chunks.lock(), 2);
        assert_eq!(errors.lock().len(), 1);
        engine.stop();
    }

    #[test]
    fn denied_permission_is_synchronous() {
        let platform = MockPlatform::new().with_permission(
            PermissionStatus {
                mic: false,
                system: true,
            },
            false,
        );
        let stats = platform.stats();
        let mut engine = PlatformEngine::new(platform, fast_config()).unwrap();
        let (b, _d, _c, _e) = bridge();

        let err = engine.start(DeviceType::Input, MOCK_MIC_ID, b).unwrap_err();
        assert_eq!(err, CaptureError::PermissionDenied(PermissionKind::Mic));
        assert_eq!(engine.state(), SessionState::Idle);
        assert_eq!(stats.opens(), 0);

        assert!(!engine.request_permission(PermissionKind::Mic));
        assert!(engine.request_permission(PermissionKind::System));
    }

    #[test]
    fn start_gate_checks_only_the_needed_capability() {
        let platform = MockPlatform::new();
        let stats = platform.stats();
        let mut engine = PlatformEngine::new(platform, fast_config()).unwrap();
        let (b, _d, _c, _e) = bridge();

        engine.start(DeviceType::Output, MOCK_SPEAKER_ID, b).unwrap();
        engine.stop();

        assert_eq!(stats.permission_checks(PermissionKind::System), 1);
        assert_eq!(stats.permission_checks(PermissionKind::Mic), 0);
    }

    #[test]
    fn nul_in_device_id_is_invalid_input() {
        let mut engine = PlatformEngine::new(MockPlatform::new(), fast_config()).unwrap();
        let (b, _d, _c, _e) = bridge();

        let err = engine.start(DeviceType::Input, "bad\0id", b).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidInput(_)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            wait_timeout_ms: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            PlatformEngine::new(MockPlatform::new(), config),
            Err(CaptureError::InvalidConfig(_))
        ));
    }
}
