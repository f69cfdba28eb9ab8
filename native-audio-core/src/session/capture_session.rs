use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::bridge::callback_bridge::CallbackBridge;
use crate::models::device::DeviceType;
use crate::models::error::CaptureError;
use crate::models::state::SessionState;
use crate::processing::sample_converter;
use crate::traits::capture_backend::{
    CaptureBackend, CaptureRequest, CaptureStream, DrainControl, WaitOutcome,
};

/// Name given to every capture thread.
pub const CAPTURE_THREAD_NAME: &str = "native-audio-capture";

/// One active capture: the dedicated thread plus the state it shares with
/// the controlling context.
///
/// The running flag is the only thing the capture thread polls to decide
/// whether to exit; `stop` clears it and joins.
pub struct CaptureSession {
    id: Uuid,
    device_type: DeviceType,
    device_id: String,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<SessionState>>,
    bridge: CallbackBridge,
    handle: Option<thread::JoinHandle<()>>,
}

/// Everything the capture thread owns.
struct CaptureContext {
    id: Uuid,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<SessionState>>,
    bridge: CallbackBridge,
    wait_timeout: Duration,
}

impl CaptureSession {
    /// Spawn the capture thread for `backend`. The session is `Starting`
    /// until the thread has the stream open.
    pub fn spawn<B: CaptureBackend>(
        backend: B,
        request: &CaptureRequest,
        bridge: CallbackBridge,
    ) -> Result<Self, CaptureError> {
        let id = Uuid::new_v4();
        let running = Arc::new(AtomicBool::new(true));
        let state = Arc::new(Mutex::new(SessionState::Starting));

        let context = CaptureContext {
            id,
            running: Arc::clone(&running),
            state: Arc::clone(&state),
            bridge: bridge.clone(),
            wait_timeout: request.config.wait_timeout(),
        };

        log::info!(
            "[{}] starting {} capture on {:?}",
            id,
            request.device_type,
            request.device_id
        );

        let handle = thread::Builder::new()
            .name(CAPTURE_THREAD_NAME.into())
            .spawn(move || run_capture_thread(backend, context))
            .map_err(|e| {
                *state.lock() = SessionState::Idle;
                CaptureError::ThreadSpawn(e.to_string())
            })?;

        Ok(Self {
            id,
            device_type: request.device_type,
            device_id: request.device_id.clone(),
            running,
            state,
            bridge,
            handle: Some(handle),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// The capture thread has not exited yet.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the running flag and block until the capture thread is gone.
    ///
    /// After this returns no further callback is dispatched for this
    /// session. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            *self.state.lock() = SessionState::Stopping;
            self.running.store(false, Ordering::SeqCst);

            if handle.thread().id() == thread::current().id() {
                // Joining ourselves would deadlock; the loop exits on its own.
                log::error!("[{}] stop called from the capture thread; not joining", self.id);
            } else if handle.join().is_err() {
                log::error!("[{}] capture thread panicked", self.id);
            }
            log::info!("[{}] capture stopped", self.id);
        }

        self.bridge.close();
        *self.state.lock() = SessionState::Idle;
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("device_type", &self.device_type)
            .field("device_id", &self.device_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Capture thread entry point. Backend errors end here as one error
/// delivery; nothing propagates out of the thread.
fn run_capture_thread<B: CaptureBackend>(backend: B, context: CaptureContext) {
    if let Err(e) = capture_loop(backend, &context) {
        log::error!("[{}] capture failed: {}", context.id, e);
        context.bridge.deliver_error(e.to_string());
    }

    {
        let mut state = context.state.lock();
        if *state != SessionState::Stopping {
            *state = SessionState::Idle;
        }
    }
    context.running.store(false, Ordering::SeqCst);
}

/// Open the stream, then wait → drain → convert → deliver until the
/// running flag clears or a backend call fails.
fn capture_loop<B: CaptureBackend>(backend: B, context: &CaptureContext) -> Result<(), CaptureError> {
    let mut stream = backend.open()?;
    let format = stream.format();
    stream.start()?;

    {
        let mut state = context.state.lock();
        if *state == SessionState::Starting {
            *state = SessionState::Running;
        }
    }
    log::debug!(
        "[{}] stream running: {} Hz, {} ch, {:?}",
        context.id,
        format.sample_rate,
        format.channels,
        format.encoding
    );
    if !format.encoding.is_supported() {
        log::warn!(
            "[{}] unsupported native encoding {:?}; delivering silence",
            context.id,
            format.encoding
        );
    }

    let result = pump_stream(&mut stream, context);
    stream.stop();
    result
}

fn pump_stream<S: CaptureStream>(stream: &mut S, context: &CaptureContext) -> Result<(), CaptureError> {
    let format = stream.format();
    let bridge = &context.bridge;

    while context.running.load(Ordering::SeqCst) {
        match stream.wait(context.wait_timeout)? {
            WaitOutcome::TimedOut => continue,
            WaitOutcome::Ready => {}
        }
        if !context.running.load(Ordering::SeqCst) {
            break;
        }

        // A backend may refill faster than a stalled consumer drains the
        // bridge; the flag is rechecked per packet so stop stays bounded.
        stream.drain(&mut |packet| {
            if !context.running.load(Ordering::SeqCst) {
                return DrainControl::Stop;
            }
            if packet.frames > 0 {
                let pcm = sample_converter::convert_to_pcm16(packet.data, packet.frames, &format, packet.silent);
                bridge.deliver_data(pcm);
            }
            DrainControl::Continue
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::callback_bridge::{self, EventDispatcher};
    use crate::models::config::EngineConfig;
    use crate::testing::{MockBackend, MockScript, MockStats};
    use std::time::Instant;

    fn request() -> CaptureRequest {
        CaptureRequest {
            device_type: DeviceType::Input,
            device_id: "mock-mic".into(),
            config: EngineConfig {
                wait_timeout_ms: 20,
                ..EngineConfig::default()
            },
        }
    }

    type Recorded = (CallbackBridge, EventDispatcher, Arc<Mutex<Vec<Vec<u8>>>>, Arc<Mutex<Vec<String>>>);

    fn bridge() -> Recorded {
        bridge_with(256, Duration::from_millis(50))
    }

    fn bridge_with(capacity: usize, delivery_timeout: Duration) -> Recorded {
        let data = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let data_sink = Arc::clone(&data);
        let error_sink = Arc::clone(&errors);
        let (bridge, dispatcher) = callback_bridge::channel(
            capacity,
            delivery_timeout,
            Box::new(move |chunk| data_sink.lock().push(chunk)),
            Box::new(move |message| error_sink.lock().push(message)),
        );
        (bridge, dispatcher, data, errors)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn delivers_converted_packets_until_stopped() {
        let _ = env_logger::builder().is_test(true).try_init();
        let stats = MockStats::default();
        let backend = MockBackend::new(MockScript::float_tone(2, 480), stats.clone());
        let (bridge, mut dispatcher, data, errors) = bridge();

        let mut session = CaptureSession::spawn(backend, &request(), bridge).unwrap();
        assert!(wait_until(|| session.state() == SessionState::Running));
        assert!(wait_until(|| dispatcher.pending() >= 3));

        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_running());
        assert_eq!(stats.streams_alive(), 0);
        assert_eq!(stats.stream_stops(), 1);

        // Everything queued before stop is discarded once the bridge closes.
        assert_eq!(dispatcher.dispatch_pending(), 0);
        assert!(data.lock().is_empty());
        assert!(errors.lock().is_empty());
    }

    #[test]
    fn chunks_are_pcm16_of_the_same_frame_count() {
        let stats = MockStats::default();
        let backend = MockBackend::new(MockScript::float_tone(2, 480), stats);
        let (bridge, mut dispatcher, data, _errors) = bridge();

        let mut session = CaptureSession::spawn(backend, &request(), bridge).unwrap();
        assert!(wait_until(|| {
            dispatcher.dispatch_pending();
            !data.lock().is_empty()
        }));
        session.stop();

        let chunks = data.lock();
        assert!(chunks.iter().all(|chunk| chunk.len() == 480 * 2 * 2));
    }

    #[test]
    fn setup_failure_reports_once_and_returns_to_idle() {
        let stats = MockStats::default();
        let script = MockScript::float_tone(2, 480)
            .fail_open(CaptureError::DeviceNotAvailable("mock-mic".into()));
        let backend = MockBackend::new(script, stats.clone());
        let (bridge, mut dispatcher, data, errors) = bridge();

        let mut session = CaptureSession::spawn(backend, &request(), bridge).unwrap();
        assert!(wait_until(|| !session.is_running()));
        assert_eq!(session.state(), SessionState::Idle);

        dispatcher.dispatch_pending();
        assert_eq!(*errors.lock(), vec!["audio device not available: mock-mic".to_string()]);
        assert!(data.lock().is_empty());
        assert_eq!(stats.streams_alive(), 0);

        session.stop();
    }

    #[test]
    fn steady_state_failure_ends_session() {
        let stats = MockStats::default();
        let script = MockScript::float_tone(1, 160).fail_after_packets(3);
        let backend = MockBackend::new(script, stats.clone());
        let (bridge, mut dispatcher, data, errors) = bridge();

        let mut session = CaptureSession::spawn(backend, &request(), bridge).unwrap();
        assert!(wait_until(|| !session.is_running()));
        assert_eq!(session.state(), SessionState::Idle);

        dispatcher.dispatch_pending();
        assert_eq!(data.lock().len(), 3);
        assert_eq!(errors.lock().len(), 1);
        assert!(errors.lock()[0].starts_with("capture stream failed"));
        assert_eq!(stats.stream_stops(), 1);

        session.stop();
    }

    #[test]
    fn timeouts_are_not_errors() {
        let stats = MockStats::default();
        // Packets arrive slower than the wait timeout.
        let script = MockScript::float_tone(1, 160).interval(Duration::from_millis(60));
        let backend = MockBackend::new(script, stats);
        let (bridge, mut dispatcher, _data, errors) = bridge();

        let mut session = CaptureSession::spawn(backend, &request(), bridge).unwrap();
        thread::sleep(Duration::from_millis(150));
        assert!(session.is_running());
        session.stop();

        dispatcher.dispatch_pending();
        assert!(errors.lock().is_empty());
    }

    #[test]
    fn silent_packets_are_zeros() {
        let stats = MockStats::default();
        let backend = MockBackend::new(MockScript::float_tone(2, 100).silent(), stats);
        let (bridge, mut dispatcher, data, _errors) = bridge();

        let mut session = CaptureSession::spawn(backend, &request(), bridge).unwrap();
        assert!(wait_until(|| {
            dispatcher.dispatch_pending();
            !data.lock().is_empty()
        }));
        session.stop();

        let chunks = data.lock();
        assert_eq!(chunks[0].len(), 100 * 2 * 2);
        assert!(chunks[0].iter().all(|&b| b == 0));
    }

    #[test]
    fn stop_twice_is_harmless() {
        let backend = MockBackend::new(MockScript::float_tone(1, 160), MockStats::default());
        let (bridge, _dispatcher, _data, _errors) = bridge();

        let mut session = CaptureSession::spawn(backend, &request(), bridge).unwrap();
        session.stop();
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn stop_is_prompt_while_consumer_stalls_on_refilling_stream() {
        let _ = env_logger::builder().is_test(true).try_init();
        let stats = MockStats::default();
        let script = MockScript::float_tone(2, 480)
            .interval(Duration::from_millis(10))
            .continuous();
        let backend = MockBackend::new(script, stats.clone());
        // Nothing dispatches; every delivery past the fourth waits out the
        // full delivery timeout.
        let (bridge, dispatcher, _data, _errors) = bridge_with(4, Duration::from_millis(250));

        let mut session = CaptureSession::spawn(backend, &request(), bridge).unwrap();
        assert!(wait_until(|| dispatcher.pending() >= 4));
        thread::sleep(Duration::from_millis(300));

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let stopper = thread::spawn(move || {
            let started = Instant::now();
            session.stop();
            let _ = done_tx.send(started.elapsed());
            session
        });

        let elapsed = done_rx
            .recv_timeout(Duration::from_secs(3))
            .expect("stop blocked behind a stalled consumer");
        assert!(elapsed < Duration::from_secs(1), "stop took {:?}", elapsed);

        let session = stopper.join().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(stats.streams_alive(), 0);
        assert_eq!(stats.stream_stops(), 1);
    }

    #[test]
    fn failure_is_reported_even_when_consumer_fell_behind() {
        let stats = MockStats::default();
        let script = MockScript::float_tone(1, 160).fail_after_packets(4);
        let backend = MockBackend::new(script, stats);
        let (bridge, mut dispatcher, data, errors) = bridge_with(2, Duration::from_millis(10));

        let mut session = CaptureSession::spawn(backend, &request(), bridge).unwrap();
        assert!(wait_until(|| !session.is_running()));

        dispatcher.dispatch_pending();
        assert_eq!(data.lock().len(), 2);
        assert_eq!(errors.lock().len(), 1);
        assert!(errors.lock()[0].starts_with("capture stream failed"));

        session.stop();
    }
}
