//! Receive pipeline: network frames in, renderable texture out.
//!
//! A dedicated capture thread blocks on the transport with a bounded
//! timeout and writes each video frame into a single lock-guarded
//! "latest frame" slot. Once per tick the render thread calls
//! [`ReceivePipeline::upload`] to move the slot contents into a
//! texture.
//!
//! There is deliberately no queue between the two threads: the slot
//! holds exactly one frame, the freshest write wins, and a frame that
//! arrives while the render thread holds the lock is discarded. The
//! writer never blocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::error::LinkError;
use crate::frame::{FrameBuffer, PixelFormat};
use crate::state::PipelineState;
use crate::texture::{TextureBridge, TextureDesc};
use crate::transport::{
    Bandwidth, CaptureEvent, CapturedFrame, ReceiverHandle, ReceiverRequest, Tally, Transport,
};

// ── ReceiveConfig ────────────────────────────────────────────────

/// Tunables for a receive pipeline.
#[derive(Debug, Clone)]
pub struct ReceiveConfig {
    /// Upper bound for one blocking capture call. Also bounds how long
    /// `disconnect` may wait for the capture thread to notice the exit
    /// flag.
    pub capture_timeout: Duration,
    /// Label under which the receiver announces itself.
    pub receiver_label: Option<String>,
    /// Pixel format requested from the transport.
    pub format: PixelFormat,
    /// Bandwidth preference.
    pub bandwidth: Bandwidth,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            capture_timeout: Duration::from_millis(1000),
            receiver_label: None,
            format: PixelFormat::Bgra8,
            bandwidth: Bandwidth::Highest,
        }
    }
}

// ── FrameSlot ────────────────────────────────────────────────────

/// The single logical slot shared by the capture and render threads.
struct FrameSlot {
    buffer: FrameBuffer,
    /// Set by the capture thread when the buffer holds bytes the
    /// texture has not seen yet.
    invalidate: bool,
    /// Whether any frame has ever arrived.
    received: bool,
}

impl FrameSlot {
    fn store(&mut self, frame: CapturedFrame) {
        if frame.data.len() != frame.byte_len() {
            warn!(
                width = frame.width,
                height = frame.height,
                stride = frame.stride,
                len = frame.data.len(),
                "dropping frame with inconsistent geometry"
            );
            return;
        }
        self.buffer.realloc_exact(frame.data.len());
        self.buffer.data.copy_from_slice(&frame.data);
        self.buffer.width = frame.width;
        self.buffer.height = frame.height;
        self.buffer.stride = frame.stride;
        self.buffer.format = frame.format;
        self.buffer.aspect_ratio = frame.aspect_ratio;
        self.buffer.timestamp = Instant::now();
        self.invalidate = true;
        self.received = true;
    }
}

// ── ReceivePipeline ──────────────────────────────────────────────

/// Receives frames from one remote source and exposes the most recent
/// one to the render thread.
pub struct ReceivePipeline {
    transport: Arc<dyn Transport>,
    config: ReceiveConfig,
    slot: Arc<Mutex<FrameSlot>>,
    exit: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    state: PipelineState,
    source_name: Option<String>,
    tally: Tally,
}

impl ReceivePipeline {
    pub fn new(transport: Arc<dyn Transport>, config: ReceiveConfig) -> Self {
        Self {
            transport,
            config,
            slot: Arc::new(Mutex::new(FrameSlot {
                buffer: FrameBuffer::empty(PixelFormat::Bgra8),
                invalidate: false,
                received: false,
            })),
            exit: Arc::new(AtomicBool::new(false)),
            thread: None,
            state: PipelineState::Disconnected,
            source_name: None,
            tally: Tally::default(),
        }
    }

    /// Attach to `source_name` and start capturing.
    ///
    /// An existing session is torn down first. Failure to open the
    /// session is soft: it is logged, the pipeline stays
    /// `Disconnected`, and nothing is retried until the next call.
    pub fn connect(&mut self, source_name: &str) {
        self.disconnect();
        self.state = PipelineState::Connecting;

        let request = ReceiverRequest {
            source_name: source_name.to_string(),
            receiver_label: self.config.receiver_label.clone(),
            format: self.config.format,
            bandwidth: self.config.bandwidth,
            allow_fielded: false,
        };
        let Some(mut handle) = self.transport.create_receiver(&request) else {
            warn!(source = source_name, "failed to open receive session");
            self.state = PipelineState::Disconnected;
            return;
        };

        handle.set_tally(Tally {
            on_program: true,
            on_preview: false,
        });
        self.tally = Tally {
            on_program: true,
            on_preview: false,
        };

        self.exit.store(false, Ordering::SeqCst);
        let slot = Arc::clone(&self.slot);
        let exit = Arc::clone(&self.exit);
        let timeout = self.config.capture_timeout;
        let spawned = std::thread::Builder::new()
            .name("framelink-capture".into())
            .spawn(move || capture_loop(handle, slot, exit, timeout));
        match spawned {
            Ok(thread) => {
                self.thread = Some(thread);
                self.source_name = Some(source_name.to_string());
                self.state = PipelineState::Connected;
                info!(source = source_name, "receive session open");
            }
            Err(e) => {
                error!(error = %e, "failed to spawn capture thread");
                self.tally = Tally::default();
                self.state = PipelineState::Disconnected;
            }
        }
    }

    /// Move the latest frame into `texture` if it is stale.
    ///
    /// Render-thread only, once per tick. A no-op until the first
    /// frame arrives. Holds the slot lock for the duration of the
    /// texture write; the capture thread discards frames that arrive
    /// meanwhile instead of waiting.
    pub fn upload<B: TextureBridge>(
        &mut self,
        bridge: &mut B,
        texture: &mut Option<B::Texture>,
    ) -> Result<(), LinkError> {
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            // a panicked capture thread leaves the last consistent frame
            Err(poisoned) => poisoned.into_inner(),
        };
        if !slot.received {
            return Ok(());
        }

        let desc = TextureDesc {
            width: slot.buffer.width,
            height: slot.buffer.height,
            format: slot.buffer.format,
        };
        let needs_create = match texture.as_ref() {
            Some(existing) => bridge.desc(existing) != desc,
            None => true,
        };
        if !slot.invalidate && !needs_create {
            return Ok(());
        }

        if needs_create {
            *texture = Some(bridge.create(desc)?);
        }
        if let Some(tex) = texture.as_mut() {
            bridge.upload(tex, &slot.buffer.data)?;
        }
        slot.invalidate = false;
        Ok(())
    }

    /// Tear the session down: set the exit flag, join the capture
    /// thread, let the handle drop. Safe to call repeatedly and on an
    /// already-disconnected pipeline.
    ///
    /// Blocks for up to one capture timeout while the thread notices
    /// the flag.
    pub fn disconnect(&mut self) {
        self.exit.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            self.state = PipelineState::ShuttingDown;
            if thread.join().is_err() {
                warn!("capture thread terminated with a panic");
            }
        }
        self.tally = Tally::default();
        self.source_name = None;
        self.state = PipelineState::Disconnected;
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Name of the currently attached source, if any.
    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    /// Tally bookkeeping for this receiver.
    pub fn tally(&self) -> Tally {
        self.tally
    }

    /// Whether any frame has arrived since the pipeline was created.
    pub fn has_received(&self) -> bool {
        self.lock_slot().received
    }

    /// Shape of the most recent frame, if any.
    pub fn latest_desc(&self) -> Option<TextureDesc> {
        let slot = self.lock_slot();
        slot.received.then(|| TextureDesc {
            width: slot.buffer.width,
            height: slot.buffer.height,
            format: slot.buffer.format,
        })
    }

    /// Current byte length of the slot's backing allocation.
    pub fn buffer_capacity(&self) -> usize {
        self.lock_slot().buffer.data.len()
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, FrameSlot> {
        match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for ReceivePipeline {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ── Capture thread ───────────────────────────────────────────────

fn capture_loop(
    mut handle: Box<dyn ReceiverHandle>,
    slot: Arc<Mutex<FrameSlot>>,
    exit: Arc<AtomicBool>,
    timeout: Duration,
) {
    while !exit.load(Ordering::SeqCst) {
        match handle.capture(timeout) {
            CaptureEvent::Video(frame) => match slot.try_lock() {
                Ok(mut slot) => slot.store(frame),
                // render thread is mid-upload: freshest-wins, this
                // frame is released unseen
                Err(_) => drop(frame),
            },
            // released without processing
            CaptureEvent::Audio(payload) => drop(payload),
            CaptureEvent::Metadata(payload) => drop(payload),
            CaptureEvent::None => {}
        }
    }
    // the handle drops here, after the loop has observed the exit
    // flag — the session is never destroyed under a live thread
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::stride_for_width;
    use crate::texture::SoftwareBridge;
    use crate::transport::loopback::LoopbackTransport;
    use crate::transport::{OutboundFrame, SenderRequest, Timecode};

    fn test_config() -> ReceiveConfig {
        ReceiveConfig {
            capture_timeout: Duration::from_millis(20),
            ..ReceiveConfig::default()
        }
    }

    fn sender_request(name: &str) -> SenderRequest {
        SenderRequest {
            source_name: name.into(),
            groups: None,
            clock_video: true,
            clock_audio: false,
        }
    }

    fn uniform_frame(width: u32, height: u32, byte: u8) -> OutboundFrame {
        let stride = stride_for_width(width);
        OutboundFrame {
            width,
            height,
            format: PixelFormat::Bgra8,
            frame_rate_n: 30_000,
            frame_rate_d: 1000,
            aspect_ratio: width as f32 / height as f32,
            stride,
            timecode: Timecode::Synthesize,
            data: vec![byte; (stride * height) as usize],
        }
    }

    /// Poll until `predicate` holds or the deadline passes.
    fn wait_for(mut predicate: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    /// Transport whose session creation always fails.
    struct NullTransport;

    impl Transport for NullTransport {
        fn initialize(&self) -> Result<(), LinkError> {
            Ok(())
        }
        fn version(&self) -> String {
            "null".into()
        }
        fn create_receiver(&self, _request: &ReceiverRequest) -> Option<Box<dyn ReceiverHandle>> {
            None
        }
        fn create_sender(
            &self,
            _request: &crate::transport::SenderRequest,
        ) -> Option<Box<dyn crate::transport::SenderHandle>> {
            None
        }
    }

    #[test]
    fn connect_failure_stays_disconnected() {
        let mut pipeline = ReceivePipeline::new(Arc::new(NullTransport), test_config());
        pipeline.connect("Nowhere");
        assert_eq!(pipeline.state(), PipelineState::Disconnected);
        assert!(pipeline.source_name().is_none());
    }

    #[test]
    fn upload_without_frames_is_a_noop() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut pipeline = ReceivePipeline::new(transport, test_config());
        let mut bridge = SoftwareBridge;
        let mut texture = None;
        pipeline.upload(&mut bridge, &mut texture).unwrap();
        assert!(texture.is_none());
    }

    #[test]
    fn buffer_reallocates_to_most_recent_length() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut sender = transport
            .create_sender(&sender_request("Resize"))
            .expect("loopback sender");
        let mut pipeline =
            ReceivePipeline::new(Arc::<LoopbackTransport>::clone(&transport), test_config());
        pipeline.connect("Resize");
        assert_eq!(pipeline.state(), PipelineState::Connected);

        sender.submit(&uniform_frame(16, 8, 0x11));
        assert!(wait_for(|| pipeline.buffer_capacity() == 16 * 4 * 8));

        sender.submit(&uniform_frame(8, 4, 0x22));
        assert!(wait_for(|| pipeline.buffer_capacity() == 8 * 4 * 4));

        pipeline.disconnect();
        assert_eq!(pipeline.state(), PipelineState::Disconnected);
    }

    #[test]
    fn reconnect_leaves_exactly_one_receiver() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut pipeline =
            ReceivePipeline::new(Arc::<LoopbackTransport>::clone(&transport), test_config());

        pipeline.connect("A");
        assert_eq!(transport.live_receivers("A"), 1);

        // identity change: the old session must be gone before the
        // new one exists
        pipeline.connect("B");
        assert_eq!(transport.live_receivers("A"), 0);
        assert_eq!(transport.live_receivers("B"), 1);

        pipeline.disconnect();
        pipeline.connect("B");
        assert_eq!(transport.live_receivers("B"), 1);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut pipeline = ReceivePipeline::new(transport, test_config());
        pipeline.disconnect();
        pipeline.connect("A");
        pipeline.disconnect();
        pipeline.disconnect();
        assert_eq!(pipeline.state(), PipelineState::Disconnected);
    }

    #[test]
    fn connect_sets_program_tally() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut sender = transport
            .create_sender(&sender_request("Tally"))
            .expect("loopback sender");
        let mut pipeline =
            ReceivePipeline::new(Arc::<LoopbackTransport>::clone(&transport), test_config());
        pipeline.connect("Tally");

        assert!(pipeline.tally().on_program);
        assert!(sender.tally().on_program);
        pipeline.disconnect();
        assert!(!pipeline.tally().on_program);
    }

    /// Alternating-writer/reader stress: every completed upload must
    /// observe a frame written entirely by one capture, never a mix.
    #[test]
    fn upload_never_observes_a_torn_frame() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut pipeline =
            ReceivePipeline::new(Arc::<LoopbackTransport>::clone(&transport), test_config());
        pipeline.connect("Stress");

        let producer = {
            let transport = Arc::<LoopbackTransport>::clone(&transport);
            std::thread::spawn(move || {
                let mut sender = transport
                    .create_sender(&sender_request("Stress"))
                    .expect("loopback sender");
                for i in 0..400u32 {
                    sender.submit(&uniform_frame(32, 8, (i % 251) as u8));
                    std::thread::sleep(Duration::from_micros(200));
                }
            })
        };

        let mut bridge = SoftwareBridge;
        let mut texture = None;
        let mut uploads = 0;
        while uploads < 100 && !producer.is_finished() {
            pipeline.upload(&mut bridge, &mut texture).unwrap();
            if let Some(tex) = texture.as_ref() {
                let bytes = tex.bytes();
                assert!(
                    bytes.iter().all(|&b| b == bytes[0]),
                    "upload observed a torn frame"
                );
                uploads += 1;
            }
        }
        producer.join().unwrap();
        pipeline.disconnect();
        assert!(uploads > 0, "no uploads completed during the stress run");
    }
}
