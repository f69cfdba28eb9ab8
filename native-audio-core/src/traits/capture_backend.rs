use std::time::Duration;

use crate::models::config::EngineConfig;
use crate::models::device::DeviceType;
use crate::models::error::CaptureError;
use crate::processing::sample_converter::NativeFormat;

/// What a `start` call asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub device_type: DeviceType,
    /// Opaque backend id, the system sentinel, or empty for the default
    /// endpoint of `device_type`.
    pub device_id: String,
    pub config: EngineConfig,
}

/// One native packet borrowed from the backend until the callback returns.
#[derive(Debug, Clone, Copy)]
pub struct NativePacket<'a> {
    pub data: &'a [u8],
    pub frames: usize,
    /// Backend marked the packet as silence; `data` may be unpopulated.
    pub silent: bool,
}

/// Result of a bounded wait on the buffer-ready signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
}

/// Returned by the packet callback of [`CaptureStream::drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainControl {
    /// Hand over the next pending packet.
    Continue,
    /// Release the current packet and return; the rest stay queued.
    Stop,
}

/// An open, event-driven native capture stream.
///
/// Lives entirely on the capture thread; it does not need to be `Send`.
pub trait CaptureStream {
    /// Format of the packets this stream hands out.
    fn format(&self) -> NativeFormat;

    /// Begin delivering packets.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Block until the backend signals buffered data or `timeout` elapses.
    fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome, CaptureError>;

    /// Pass pending packets to `on_packet`, releasing each back to the
    /// backend afterwards, until none are left or the callback returns
    /// [`DrainControl::Stop`]. Backends that keep refilling while drained
    /// must check the callback's answer after every packet. Returns the
    /// number of packets drained.
    fn drain(
        &mut self,
        on_packet: &mut dyn FnMut(NativePacket<'_>) -> DrainControl,
    ) -> Result<usize, CaptureError>;

    /// Stop delivering packets. Called once before the stream is dropped.
    fn stop(&mut self);
}

/// Platform-specific recipe for opening a capture stream.
///
/// Built on the controlling thread, moved to the capture thread, and opened
/// there so thread-affine OS objects never cross threads.
pub trait CaptureBackend: Send + 'static {
    type Stream: CaptureStream;

    /// Resolve the endpoint, negotiate its format, and open the stream.
    fn open(self) -> Result<Self::Stream, CaptureError>;
}
