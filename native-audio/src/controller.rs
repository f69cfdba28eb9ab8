use std::str::FromStr;
use std::time::Duration;

use native_audio_core::bridge::callback_bridge::{self, EventDispatcher};
use native_audio_core::models::config::EngineConfig;
use native_audio_core::models::device::{AudioDevice, AudioFormat, DeviceType, PermissionKind, PermissionStatus};
use native_audio_core::models::error::CaptureError;
use native_audio_core::models::state::SessionState;
use native_audio_core::traits::audio_engine::AudioEngine;

use crate::factory::create_platform_engine;

/// Host-facing handle on one engine.
///
/// Owns the engine and the dispatcher of the current session. Data and
/// error callbacks run only inside [`dispatch_pending`](Self::dispatch_pending)
/// and [`dispatch_timeout`](Self::dispatch_timeout), on the caller's
/// thread. Callbacks must not call back into the controller.
pub struct AudioController {
    engine: Box<dyn AudioEngine>,
    dispatcher: Option<EventDispatcher>,
}

impl AudioController {
    /// Controller over the build target's engine.
    pub fn new(config: EngineConfig) -> Result<Self, CaptureError> {
        Ok(Self::with_engine(create_platform_engine(config)?))
    }

    pub fn with_engine(engine: Box<dyn AudioEngine>) -> Self {
        Self {
            engine,
            dispatcher: None,
        }
    }

    /// Start capturing. No-op while a session is active.
    ///
    /// Invalid input and denied permission are returned here; failures on
    /// the capture thread arrive once through `on_error`.
    pub fn start<D, E>(
        &mut self,
        device_type: DeviceType,
        device_id: &str,
        on_data: D,
        on_error: E,
    ) -> Result<(), CaptureError>
    where
        D: FnMut(Vec<u8>) + Send + 'static,
        E: FnMut(String) + Send + 'static,
    {
        if self.engine.state().is_active() {
            log::debug!("start ignored: capture already active");
            return Ok(());
        }

        // A session that failed on its own may still hold its error.
        if let Some(mut previous) = self.dispatcher.take() {
            previous.dispatch_pending();
        }

        let config = self.engine.config();
        let (bridge, dispatcher) = callback_bridge::channel(
            config.delivery_queue_capacity,
            config.delivery_timeout(),
            Box::new(on_data),
            Box::new(on_error),
        );
        self.engine.start(device_type, device_id, bridge)?;
        self.dispatcher = Some(dispatcher);
        Ok(())
    }

    /// [`start`](Self::start) with the device type in its string form
    /// (`"input"` / `"output"`).
    pub fn start_named<D, E>(
        &mut self,
        device_type: &str,
        device_id: &str,
        on_data: D,
        on_error: E,
    ) -> Result<(), CaptureError>
    where
        D: FnMut(Vec<u8>) + Send + 'static,
        E: FnMut(String) + Send + 'static,
    {
        let device_type = DeviceType::from_str(device_type)?;
        self.start(device_type, device_id, on_data, on_error)
    }

    /// Stop the session and join its thread. Nothing queued before the call
    /// is dispatched afterwards.
    pub fn stop(&mut self) {
        self.engine.stop();
    }

    /// Run callbacks for everything already delivered.
    pub fn dispatch_pending(&mut self) -> usize {
        self.dispatcher.as_mut().map_or(0, EventDispatcher::dispatch_pending)
    }

    /// Wait up to `timeout` for a delivery, then run everything queued.
    pub fn dispatch_timeout(&mut self, timeout: Duration) -> usize {
        match self.dispatcher.as_mut() {
            Some(dispatcher) => dispatcher.dispatch_timeout(timeout),
            None => 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.engine.state()
    }

    pub fn engine(&self) -> &dyn AudioEngine {
        self.engine.as_ref()
    }

    pub fn devices(&self) -> Vec<AudioDevice> {
        self.engine.get_devices()
    }

    pub fn device_format(&self, device_id: &str) -> Result<AudioFormat, CaptureError> {
        format_of(self.engine.as_ref(), device_id)
    }

    pub fn check_permission(&self) -> PermissionStatus {
        self.engine.check_permission()
    }

    /// May block while the OS shows its consent dialog.
    pub fn request_permission(&self, kind: PermissionKind) -> bool {
        self.engine.request_permission(kind)
    }

    /// Device listing through a scratch engine.
    pub fn get_devices(config: EngineConfig) -> Result<Vec<AudioDevice>, CaptureError> {
        Ok(create_platform_engine(config)?.get_devices())
    }

    /// Format query through a scratch engine.
    pub fn get_device_format(config: EngineConfig, device_id: &str) -> Result<AudioFormat, CaptureError> {
        format_of(create_platform_engine(config)?.as_ref(), device_id)
    }
}

impl Drop for AudioController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn format_of(engine: &dyn AudioEngine, device_id: &str) -> Result<AudioFormat, CaptureError> {
    let format = engine.get_device_format(device_id);
    if format.is_available() {
        Ok(format)
    } else {
        Err(CaptureError::FormatUnavailable(device_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use native_audio_core::session::platform_engine::PlatformEngine;
    use native_audio_core::testing::{MockPlatform, MockScript, MOCK_MIC_ID, MOCK_SPEAKER_ID};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn controller(platform: MockPlatform) -> AudioController {
        let config = EngineConfig {
            wait_timeout_ms: 20,
            ..EngineConfig::default()
        };
        AudioController::with_engine(Box::new(PlatformEngine::new(platform, config).unwrap()))
    }

    #[derive(Clone, Default)]
    struct Recorder {
        chunks: Arc<Mutex<Vec<Vec<u8>>>>,
        errors: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn on_data(&self) -> impl FnMut(Vec<u8>) + Send + 'static {
            let chunks = Arc::clone(&self.chunks);
            move |chunk| chunks.lock().push(chunk)
        }

        fn on_error(&self) -> impl FnMut(String) + Send + 'static {
            let errors = Arc::clone(&self.errors);
            move |message| errors.lock().push(message)
        }
    }

    fn pump(controller: &mut AudioController, duration: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            controller.dispatch_timeout(Duration::from_millis(10));
        }
    }

    fn wait_until_idle(controller: &AudioController) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !controller.state().is_idle() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn capture_mic_then_stop() {
        init_logger();
        let recorder = Recorder::default();
        let mut controller = controller(MockPlatform::new());

        controller
            .start(DeviceType::Input, MOCK_MIC_ID, recorder.on_data(), recorder.on_error())
            .unwrap();
        pump(&mut controller, Duration::from_millis(200));
        controller.stop();

        let chunks = recorder.chunks.lock();
        assert!(!chunks.is_empty());
        // Default mock packets: 480 stereo frames of 16-bit output.
        assert!(chunks.iter().all(|c| c.len() == 480 * 2 * 2));
        assert!(recorder.errors.lock().is_empty());
    }

    #[test]
    fn nothing_is_dispatched_after_stop() {
        let recorder = Recorder::default();
        let mut controller = controller(MockPlatform::new());

        controller
            .start(DeviceType::Output, MOCK_SPEAKER_ID, recorder.on_data(), recorder.on_error())
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        controller.stop();

        assert_eq!(controller.dispatch_pending(), 0);
        assert_eq!(controller.dispatch_timeout(Duration::from_millis(20)), 0);
        assert!(recorder.chunks.lock().is_empty());
    }

    #[test]
    fn setup_failure_reports_once_then_restart_works() {
        let recorder = Recorder::default();
        let mut controller = controller(MockPlatform::new());

        controller
            .start(DeviceType::Input, "unplugged", recorder.on_data(), recorder.on_error())
            .unwrap();
        wait_until_idle(&controller);
        controller.dispatch_pending();
        assert_eq!(
            *recorder.errors.lock(),
            vec!["audio device not available: unplugged".to_string()]
        );

        let second = Recorder::default();
        controller
            .start(DeviceType::Input, "", second.on_data(), second.on_error())
            .unwrap();
        pump(&mut controller, Duration::from_millis(50));
        controller.stop();
        assert!(!second.chunks.lock().is_empty());
        assert_eq!(recorder.errors.lock().len(), 1);
    }

    #[test]
    fn failed_session_error_survives_restart() {
        let platform = MockPlatform::new().with_script(MockScript::float_tone(1, 32).fail_after_packets(1));
        let recorder = Recorder::default();
        let mut controller = controller(platform);

        controller
            .start(DeviceType::Input, MOCK_MIC_ID, recorder.on_data(), recorder.on_error())
            .unwrap();
        wait_until_idle(&controller);

        // Not dispatched yet; the restart flushes it to the old callbacks.
        let second = Recorder::default();
        controller
            .start(DeviceType::Input, MOCK_MIC_ID, second.on_data(), second.on_error())
            .unwrap();
        controller.stop();

        assert_eq!(recorder.errors.lock().len(), 1);
        assert_eq!(recorder.chunks.lock().len(), 1);
    }

    #[test]
    fn second_start_keeps_first_callbacks() {
        let platform = MockPlatform::new();
        let stats = platform.stats();
        let first = Recorder::default();
        let second = Recorder::default();
        let mut controller = controller(platform);

        controller
            .start(DeviceType::Input, MOCK_MIC_ID, first.on_data(), first.on_error())
            .unwrap();
        controller
            .start(DeviceType::Input, MOCK_MIC_ID, second.on_data(), second.on_error())
            .unwrap();
        pump(&mut controller, Duration::from_millis(50));
        controller.stop();

        assert_eq!(stats.opens(), 1);
        assert!(!first.chunks.lock().is_empty());
        assert!(second.chunks.lock().is_empty());
    }

    #[test]
    fn unknown_device_type_string_is_invalid_input() {
        let recorder = Recorder::default();
        let mut controller = controller(MockPlatform::new());

        let err = controller
            .start_named("speaker", "", recorder.on_data(), recorder.on_error())
            .unwrap_err();
        assert!(matches!(err, CaptureError::InvalidInput(_)));
        assert!(controller.state().is_idle());

        controller
            .start_named("INPUT", "", recorder.on_data(), recorder.on_error())
            .unwrap();
        controller.stop();
    }

    #[test]
    fn denied_mic_is_synchronous_and_spawns_nothing() {
        let platform = MockPlatform::new().with_permission(
            PermissionStatus {
                mic: false,
                system: true,
            },
            true,
        );
        let stats = platform.stats();
        let recorder = Recorder::default();
        let mut controller = controller(platform);

        let err = controller
            .start(DeviceType::Input, "", recorder.on_data(), recorder.on_error())
            .unwrap_err();
        assert_eq!(err, CaptureError::PermissionDenied(PermissionKind::Mic));
        assert_eq!(stats.opens(), 0);

        assert!(controller.request_permission(PermissionKind::Mic));
        assert_eq!(stats.permission_requests(), 1);
        assert!(!controller.check_permission().mic);
    }

    #[test]
    fn format_sentinel_becomes_an_error() {
        let controller = controller(MockPlatform::new());

        assert_eq!(
            controller.device_format("missing"),
            Err(CaptureError::FormatUnavailable("missing".into()))
        );
        let format = controller.device_format(MOCK_SPEAKER_ID).unwrap();
        assert_eq!((format.sample_rate, format.channels, format.bit_depth), (48000, 2, 16));
        assert_eq!(controller.devices().len(), 2);
    }

    #[test]
    fn drop_stops_the_session() {
        let platform = MockPlatform::new();
        let stats = platform.stats();
        let recorder = Recorder::default();
        let mut controller = controller(platform);

        controller
            .start(DeviceType::Input, MOCK_MIC_ID, recorder.on_data(), recorder.on_error())
            .unwrap();
        drop(controller);

        assert_eq!(stats.streams_alive(), 0);
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    #[test]
    fn static_queries_need_a_supported_platform() {
        assert_eq!(
            AudioController::get_devices(EngineConfig::default()),
            Err(CaptureError::UnsupportedPlatform)
        );
        assert_eq!(
            AudioController::get_device_format(EngineConfig::default(), ""),
            Err(CaptureError::UnsupportedPlatform)
        );
    }
}
