//! Transport boundary — the opaque SDK seam the pipelines talk to.
//!
//! The wire protocol itself is out of scope: the pipelines only ever
//! "capture the next frame", "submit a frame", and "query link status"
//! through the traits defined here. Every call is synchronous and
//! blocking from the caller's perspective, which is why each pipeline
//! confines its transport traffic to a dedicated background thread.
//!
//! Handle lifetime maps onto ownership: a session handle is destroyed
//! by dropping it, and a captured payload is released back to the
//! transport by dropping it. Moving a payload by value through the
//! pipeline therefore guarantees release on every exit path, including
//! error and shutdown.

pub mod loopback;

use std::time::Duration;

use bytes::Bytes;

use crate::error::LinkError;
use crate::frame::PixelFormat;

// ── Session requests ─────────────────────────────────────────────

/// Bandwidth preference for a receive session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bandwidth {
    /// Full-resolution stream.
    #[default]
    Highest,
    /// Reduced-bandwidth preview stream.
    Lowest,
}

/// Parameters for opening a receive session.
#[derive(Debug, Clone)]
pub struct ReceiverRequest {
    /// Name of the remote source to attach to.
    pub source_name: String,
    /// Label under which this receiver announces itself.
    pub receiver_label: Option<String>,
    /// Desired pixel format for delivered frames.
    pub format: PixelFormat,
    /// Bandwidth preference.
    pub bandwidth: Bandwidth,
    /// When `false`, the transport delivers whole progressive frames
    /// only (no field de-interlacing).
    pub allow_fielded: bool,
}

/// Parameters for opening a send session.
#[derive(Debug, Clone)]
pub struct SenderRequest {
    /// Name this sender publishes itself under.
    pub source_name: String,
    /// Optional transport group membership.
    pub groups: Option<String>,
    /// Let the transport pace video submission to the frame rate.
    pub clock_video: bool,
    /// Let the transport pace audio submission.
    pub clock_audio: bool,
}

// ── Tally ────────────────────────────────────────────────────────

/// Downstream feedback: whether the stream is live or in preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tally {
    /// Shown on program output.
    pub on_program: bool,
    /// Shown on a preview bus.
    pub on_preview: bool,
}

// ── Captured payloads ────────────────────────────────────────────

/// A video frame captured from the transport.
///
/// Dropping the frame is the release call — the payload must be
/// consumed by value on every path.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Row pitch in bytes.
    pub stride: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Picture aspect ratio as reported by the sender.
    pub aspect_ratio: f32,
    /// Sender-side timestamp in microseconds.
    pub timestamp_us: i64,
    /// Pixel data — `stride * height` bytes.
    pub data: Bytes,
}

impl CapturedFrame {
    /// Byte size the frame's geometry implies (`stride * height`).
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }
}

/// An opaque non-video payload (audio or metadata). Dropping it
/// releases the transport-owned memory.
#[derive(Debug)]
pub struct CapturedPayload {
    /// Raw payload bytes; never interpreted by the pipelines.
    pub data: Bytes,
}

/// Result of one bounded-timeout capture call.
pub enum CaptureEvent {
    /// Nothing arrived within the timeout.
    None,
    /// A video frame.
    Video(CapturedFrame),
    /// An audio payload — released without processing.
    Audio(CapturedPayload),
    /// A metadata payload — released without processing.
    Metadata(CapturedPayload),
}

// ── Outbound frames ──────────────────────────────────────────────

/// Timestamp policy for a submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timecode {
    /// The sender synthesizes the timestamp at submission time.
    #[default]
    Synthesize,
    /// Explicit timestamp in microseconds.
    At(i64),
}

/// A frame descriptor handed to a send session.
///
/// Owns its pixel buffer; the transport copies what it needs during
/// [`SenderHandle::submit`], so the buffer is freed by the transmit
/// thread right after the attempt.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Frame rate numerator (e.g. `30_000` for 30 fps).
    pub frame_rate_n: u32,
    /// Frame rate denominator (e.g. `1000`).
    pub frame_rate_d: u32,
    /// Picture aspect ratio.
    pub aspect_ratio: f32,
    /// Row pitch in bytes.
    pub stride: u32,
    /// Timestamp policy.
    pub timecode: Timecode,
    /// Pixel data — `stride * height` bytes, owned.
    pub data: Vec<u8>,
}

impl OutboundFrame {
    /// Byte size the frame's geometry implies (`stride * height`).
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }
}

// ── Session traits ───────────────────────────────────────────────

/// An open receive session. Exactly one exists per receive pipeline;
/// it lives on the capture thread and is destroyed by dropping it
/// after the thread has been joined.
pub trait ReceiverHandle: Send {
    /// Block for up to `timeout` waiting for the next captured
    /// payload. Returns [`CaptureEvent::None`] on timeout so callers
    /// can re-check their exit flag periodically.
    fn capture(&mut self, timeout: Duration) -> CaptureEvent;

    /// Report this receiver's tally state upstream.
    fn set_tally(&mut self, tally: Tally);
}

/// An open send session. Shared between the configuration path and
/// the transmit thread under a single lock.
pub trait SenderHandle: Send {
    /// Submit one video frame. The transport does not take ownership
    /// of the buffer.
    fn submit(&mut self, frame: &OutboundFrame);

    /// Number of receivers currently attached, waiting up to
    /// `timeout` for the transport to answer.
    fn connection_count(&mut self, timeout: Duration) -> usize;

    /// Poll the current tally state.
    fn tally(&mut self) -> Tally;
}

/// Factory for transport sessions.
///
/// `initialize` is called once per runtime; failure is fatal to the
/// instance (never retried). Session creation returns `None` on
/// failure — a soft error retried only on the next explicit
/// reconfiguration.
pub trait Transport: Send + Sync {
    /// One-time library initialization.
    fn initialize(&self) -> Result<(), LinkError>;

    /// Transport library version string.
    fn version(&self) -> String;

    /// Open a receive session, or `None` if the source cannot be
    /// attached.
    fn create_receiver(&self, request: &ReceiverRequest) -> Option<Box<dyn ReceiverHandle>>;

    /// Open a send session, or `None` on failure.
    fn create_sender(&self, request: &SenderRequest) -> Option<Box<dyn SenderHandle>>;
}
