use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Select, SendTimeoutError, Sender, TryRecvError, TrySendError};

/// Consumer callback for converted PCM chunks. Ownership of the buffer moves
/// into the callback.
pub type DataCallback = Box<dyn FnMut(Vec<u8>) + Send + 'static>;

/// Consumer callback for human-readable capture errors.
pub type ErrorCallback = Box<dyn FnMut(String) + Send + 'static>;

/// One queued delivery from the capture thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Data(Vec<u8>),
    Error(String),
}

#[derive(Debug)]
struct BridgeShared {
    open: AtomicBool,
    dropped: AtomicUsize,
}

/// Create a bridge pair: the producer half goes to the capture thread, the
/// dispatcher stays on the consumer's context.
///
/// Data chunks share a bounded queue of `capacity`. Errors get a separate
/// one-slot queue so a full data queue can never crowd one out; a session
/// reports at most one error, as its last event.
pub fn channel(
    capacity: usize,
    delivery_timeout: Duration,
    on_data: DataCallback,
    on_error: ErrorCallback,
) -> (CallbackBridge, EventDispatcher) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
    let (error_sender, error_receiver) = crossbeam_channel::bounded(1);
    let shared = Arc::new(BridgeShared {
        open: AtomicBool::new(true),
        dropped: AtomicUsize::new(0),
    });

    let bridge = CallbackBridge {
        sender,
        error_sender,
        shared: Arc::clone(&shared),
        delivery_timeout,
    };
    let dispatcher = EventDispatcher {
        receiver,
        error_receiver,
        shared,
        on_data,
        on_error,
    };
    (bridge, dispatcher)
}

/// Producer half of the callback bridge.
///
/// Deliveries never block longer than the configured timeout and never
/// panic: a full queue drops the chunk, a vanished consumer drops
/// everything. Errors never block and are only lost once the bridge is
/// closed or the consumer is gone.
#[derive(Debug, Clone)]
pub struct CallbackBridge {
    sender: Sender<Vec<u8>>,
    error_sender: Sender<String>,
    shared: Arc<BridgeShared>,
    delivery_timeout: Duration,
}

impl CallbackBridge {
    /// Queue a PCM chunk. Empty buffers are not delivered.
    pub fn deliver_data(&self, data: Vec<u8>) -> bool {
        if data.is_empty() || !self.is_open() {
            return false;
        }

        match self.sender.send_timeout(data, self.delivery_timeout) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) => {
                let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                if dropped == 0 {
                    log::warn!("Consumer is not keeping up; dropping audio chunks");
                }
                false
            }
            Err(SendTimeoutError::Disconnected(_)) => false,
        }
    }

    /// Queue the session's error. It is dispatched after every data chunk
    /// already queued. Only the first error is kept.
    pub fn deliver_error(&self, message: impl Into<String>) -> bool {
        if !self.is_open() {
            return false;
        }

        match self.error_sender.try_send(message.into()) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                log::debug!("error already pending; discarding {:?}", message);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Stop dispatching. Events still queued are discarded by the dispatcher.
    pub fn close(&self) {
        self.shared.open.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Chunks dropped because the consumer fell behind.
    pub fn dropped_chunks(&self) -> usize {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer half of the callback bridge.
///
/// Callbacks run on whichever thread calls `dispatch_*`, which is meant to be
/// the consumer's own context.
pub struct EventDispatcher {
    receiver: Receiver<Vec<u8>>,
    error_receiver: Receiver<String>,
    shared: Arc<BridgeShared>,
    on_data: DataCallback,
    on_error: ErrorCallback,
}

impl EventDispatcher {
    /// Run callbacks for everything already queued without waiting. Queued
    /// data is dispatched before a queued error.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut dispatched = self.dispatch_data();
        if let Ok(message) = self.error_receiver.try_recv() {
            // Chunks sent just before the error may land after the first pass.
            dispatched += self.dispatch_data();
            if self.dispatch(CaptureEvent::Error(message)) {
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Wait up to `timeout` for the first event, then drain the queue.
    pub fn dispatch_timeout(&mut self, timeout: Duration) -> usize {
        let ready = {
            let mut select = Select::new();
            select.recv(&self.receiver);
            select.recv(&self.error_receiver);
            select.ready_timeout(timeout).is_ok()
        };
        if !ready {
            return 0;
        }
        self.dispatch_pending()
    }

    /// Events waiting to be dispatched.
    pub fn pending(&self) -> usize {
        self.receiver.len() + self.error_receiver.len()
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    fn dispatch_data(&mut self) -> usize {
        let mut dispatched = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(data) => {
                    if self.dispatch(CaptureEvent::Data(data)) {
                        dispatched += 1;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        dispatched
    }

    fn dispatch(&mut self, event: CaptureEvent) -> bool {
        if !self.is_open() {
            return false;
        }
        match event {
            CaptureEvent::Data(data) => (self.on_data)(data),
            CaptureEvent::Error(message) => (self.on_error)(message),
        }
        true
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("pending", &self.pending())
            .field("open", &self.is_open())
            .finish()
    }
}
