//! Send pipeline: renderable texture in, network frames out.
//!
//! The render thread calls [`SendPipeline::submit`] once per tick: it
//! reads the texture back to CPU memory, wraps the bytes in a frame
//! descriptor, and enqueues it — fire-and-forget, never blocking. A
//! dedicated transmit thread paces submission to the transport and
//! enforces backpressure by discarding every pending frame except the
//! newest.
//!
//! The send session handle is shared between the configuration path
//! and the transmit thread under one lock; the thread only ever
//! touches the handle after a successful `try_lock`, so reconfiguring
//! is never starved and never races a submission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use tracing::{debug, error, info, warn};

use crate::frame::{stride_for_width, swap_red_blue};
use crate::state::PipelineState;
use crate::texture::TextureBridge;
use crate::transport::{OutboundFrame, SenderHandle, SenderRequest, Tally, Timecode, Transport};

// ── SendConfig ───────────────────────────────────────────────────

/// Tunables for a send pipeline.
#[derive(Debug, Clone)]
pub struct SendConfig {
    /// Pending-queue capacity. The transmit thread keeps observable
    /// depth at most 1; the extra room only absorbs bursts between
    /// its wakeups.
    pub queue_capacity: usize,
    /// How long the transmit thread waits for a queued frame before
    /// re-checking its exit flag.
    pub queue_wait: Duration,
    /// Sleep between handle-lock attempts while the configuration
    /// path owns the lock or no session exists.
    pub handle_retry: Duration,
    /// Textures with either dimension below this are rejected
    /// silently.
    pub min_dimension: u32,
    /// Apply the R↔B channel swap before transmission.
    pub swap_channels: bool,
    /// Initial state of the send-enabled flag.
    pub send_enabled: bool,
    /// Optional transport group membership for the session.
    pub groups: Option<String>,
    /// Let the transport pace video submission.
    pub clock_video: bool,
    /// Let the transport pace audio submission.
    pub clock_audio: bool,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 8,
            queue_wait: Duration::from_millis(250),
            handle_retry: Duration::from_millis(20),
            min_dimension: 8,
            swap_channels: false,
            send_enabled: true,
            groups: None,
            clock_video: true,
            clock_audio: false,
        }
    }
}

// ── SendPipeline ─────────────────────────────────────────────────

type SharedHandle = Arc<Mutex<Option<Box<dyn SenderHandle>>>>;

/// Publishes frames captured from a texture to one named endpoint.
pub struct SendPipeline {
    transport: Arc<dyn Transport>,
    config: SendConfig,
    handle: SharedHandle,
    /// Producer side of the pending queue; `None` once shut down.
    queue_tx: Option<Sender<OutboundFrame>>,
    /// Kept for the teardown drain.
    queue_rx: Receiver<OutboundFrame>,
    exit: Arc<AtomicBool>,
    send_enabled: Arc<AtomicBool>,
    tally: Arc<Mutex<Tally>>,
    thread: Option<JoinHandle<()>>,
    /// Reusable CPU-side readback buffer, resized only when the
    /// mapped length changes.
    scratch: Vec<u8>,
    source_name: String,
    state: PipelineState,
}

impl SendPipeline {
    /// Create the pipeline and start its transmit thread. The thread
    /// idles until [`configure`](Self::configure) opens a session.
    pub fn new(transport: Arc<dyn Transport>, config: SendConfig) -> Self {
        let (queue_tx, queue_rx) = bounded(config.queue_capacity);
        let handle: SharedHandle = Arc::new(Mutex::new(None));
        let exit = Arc::new(AtomicBool::new(false));
        let send_enabled = Arc::new(AtomicBool::new(config.send_enabled));
        let tally = Arc::new(Mutex::new(Tally::default()));

        let spawned = std::thread::Builder::new()
            .name("framelink-transmit".into())
            .spawn({
                let handle = Arc::clone(&handle);
                let queue = queue_rx.clone();
                let exit = Arc::clone(&exit);
                let send_enabled = Arc::clone(&send_enabled);
                let tally = Arc::clone(&tally);
                let queue_wait = config.queue_wait;
                let handle_retry = config.handle_retry;
                move || transmit_loop(handle, queue, exit, send_enabled, tally, queue_wait, handle_retry)
            });
        let thread = match spawned {
            Ok(thread) => Some(thread),
            Err(e) => {
                error!(error = %e, "failed to spawn transmit thread");
                None
            }
        };

        Self {
            transport,
            config,
            handle,
            queue_tx: Some(queue_tx),
            queue_rx,
            exit,
            send_enabled,
            tally,
            thread,
            scratch: Vec::new(),
            source_name: String::new(),
            state: PipelineState::Disconnected,
        }
    }

    /// (Re-)create the send session for `source_name`.
    ///
    /// No-op when the name is unchanged. An empty name clears the
    /// session. Any existing session is destroyed before a new one is
    /// opened — never two live handles. Session-creation failure is
    /// soft: logged, retried only on the next name change.
    pub fn configure(&mut self, source_name: &str) {
        if source_name == self.source_name {
            return;
        }
        if self.queue_tx.is_none() {
            warn!("configure called on a shut-down pipeline");
            return;
        }
        self.source_name = source_name.to_string();

        let shared = Arc::clone(&self.handle);
        let mut guard = lock_handle(&shared);
        // destroy the old session before anything else
        *guard = None;

        if source_name.is_empty() {
            drop(guard);
            info!("send session cleared");
            self.state = PipelineState::Disconnected;
            return;
        }

        self.state = PipelineState::Connecting;
        let request = SenderRequest {
            source_name: source_name.to_string(),
            groups: self.config.groups.clone(),
            clock_video: self.config.clock_video,
            clock_audio: self.config.clock_audio,
        };
        match self.transport.create_sender(&request) {
            Some(handle) => {
                *guard = Some(handle);
                drop(guard);
                self.state = PipelineState::Connected;
                info!(source = source_name, "send session open");
            }
            None => {
                drop(guard);
                warn!(source = source_name, "failed to open send session");
                self.state = PipelineState::Disconnected;
            }
        }
    }

    /// Read `texture` back and enqueue it for transmission.
    ///
    /// Render-thread only, once per tick, meaningful only while a
    /// session is configured. Degenerate textures are rejected
    /// silently; every other failure is logged and drops the frame —
    /// never fatal to the render loop.
    pub fn submit<B: TextureBridge>(&mut self, bridge: &mut B, texture: &B::Texture, framerate: u32) {
        if !self.state.is_connected() {
            return;
        }
        let desc = bridge.desc(texture);
        if desc.width < self.config.min_dimension || desc.height < self.config.min_dimension {
            return;
        }

        let stride = stride_for_width(desc.width);
        let buffer_len = stride as usize * desc.height as usize;
        let aspect_ratio = desc.width as f32 / desc.height as f32;

        let mapped = match bridge.readback(texture) {
            Ok(mapped) => mapped,
            Err(e) => {
                error!(error = %e, "texture readback failed; frame dropped");
                return;
            }
        };
        if self.scratch.len() != mapped.len() {
            self.scratch = vec![0u8; mapped.len()];
        }
        self.scratch.copy_from_slice(mapped);

        if self.scratch.len() != buffer_len {
            warn!(
                expected = buffer_len,
                actual = self.scratch.len(),
                "readback length does not match frame geometry; frame dropped"
            );
            return;
        }

        // the frame's own buffer; freed by whoever drops the frame
        let mut data = self.scratch.clone();
        let format = if self.config.swap_channels {
            swap_red_blue(&mut data);
            desc.format.swapped()
        } else {
            desc.format
        };

        let frame = OutboundFrame {
            width: desc.width,
            height: desc.height,
            format,
            frame_rate_n: framerate.max(1) * 1000,
            frame_rate_d: 1000,
            aspect_ratio,
            stride,
            timecode: Timecode::Synthesize,
            data,
        };

        let Some(tx) = self.queue_tx.as_ref() else {
            error!("pending queue closed; frame dropped");
            return;
        };
        match tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => error!("pending queue full; frame dropped"),
            Err(TrySendError::Disconnected(_)) => error!("pending queue closed; frame dropped"),
        }
    }

    /// Gate actual transmission. Frames keep flowing through the
    /// queue (and keep being paced and discarded) either way.
    pub fn set_send_enabled(&self, enabled: bool) {
        self.send_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn send_enabled(&self) -> bool {
        self.send_enabled.load(Ordering::SeqCst)
    }

    /// Last tally state observed by the transmit thread.
    pub fn tally(&self) -> Tally {
        match self.tally.lock() {
            Ok(tally) => *tally,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Number of receivers attached to the session, or `None` without
    /// a session. May wait for the transmit thread to release the
    /// handle lock.
    pub fn connection_count(&self, timeout: Duration) -> Option<usize> {
        let shared = Arc::clone(&self.handle);
        let mut guard = lock_handle(&shared);
        guard.as_mut().map(|handle| handle.connection_count(timeout))
    }

    /// Frames currently sitting in the pending queue.
    pub fn pending_frames(&self) -> usize {
        self.queue_rx.len()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The configured endpoint name (empty when cleared).
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Tear the pipeline down: set the exit flag, join the transmit
    /// thread, close the queue to further additions, drain and free
    /// whatever is still queued, destroy the session handle — in that
    /// order. Safe to call repeatedly; a shut-down pipeline cannot be
    /// reconfigured.
    pub fn shutdown(&mut self) {
        self.state = PipelineState::ShuttingDown;
        self.exit.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("transmit thread terminated with a panic");
            }
        }

        self.queue_tx = None;
        let mut drained = 0usize;
        while self.queue_rx.try_recv().is_ok() {
            drained += 1;
        }
        if drained > 0 {
            debug!(drained, "freed frames left in the pending queue");
        }

        let shared = Arc::clone(&self.handle);
        let mut guard = lock_handle(&shared);
        *guard = None;
        drop(guard);

        self.source_name.clear();
        self.state = PipelineState::Disconnected;
    }
}

impl Drop for SendPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock_handle(shared: &SharedHandle) -> MutexGuard<'_, Option<Box<dyn SenderHandle>>> {
    match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ── Transmit thread ──────────────────────────────────────────────

fn transmit_loop(
    handle: SharedHandle,
    queue: Receiver<OutboundFrame>,
    exit: Arc<AtomicBool>,
    send_enabled: Arc<AtomicBool>,
    tally: Arc<Mutex<Tally>>,
    queue_wait: Duration,
    handle_retry: Duration,
) {
    let mut last_tally = Tally::default();

    while !exit.load(Ordering::SeqCst) {
        // never block the configuration path: back off when the lock
        // is contended or no session exists yet
        let mut guard = match handle.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                std::thread::sleep(handle_retry);
                continue;
            }
        };
        let Some(sender) = guard.as_mut() else {
            drop(guard);
            std::thread::sleep(handle_retry);
            continue;
        };

        match queue.recv_timeout(queue_wait) {
            Ok(mut frame) => {
                // keep only the newest pending frame
                let mut discarded = 0usize;
                while let Ok(newer) = queue.try_recv() {
                    frame = newer;
                    discarded += 1;
                }
                if discarded > 0 {
                    debug!(discarded, "discarded stale pending frames");
                }
                if send_enabled.load(Ordering::SeqCst) {
                    sender.submit(&frame);
                }
                // frame buffer freed here whether or not it was sent
            }
            Err(RecvTimeoutError::Timeout) => {}
            // only a teardown race closes the queue; the exit flag
            // ends the loop right after
            Err(RecvTimeoutError::Disconnected) => {}
        }

        let current = sender.tally();
        if current != last_tally {
            debug!(
                on_program = current.on_program,
                on_preview = current.on_preview,
                "tally changed"
            );
            last_tally = current;
            if let Ok(mut shared) = tally.lock() {
                *shared = current;
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
