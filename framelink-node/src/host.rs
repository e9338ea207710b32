//! Demo run loop: test pattern → send pipeline → loopback transport →
//! receive pipeline → software texture.
//!
//! Plays the role a render host would: it drives both pipelines once
//! per tick from a single "render" thread, paces itself to the
//! configured frame rate, and reports stats once a second.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use tracing::{debug, error, info, warn};

use framelink_core::pattern::PatternGenerator;
use framelink_core::{
    LinkError, LoopbackTransport, PixelFormat, ReceivePipeline, Runtime, SendPipeline,
    SoftwareBridge, SoftwareTexture, SourceDiscovery, TextureBridge, TextureDesc,
};

use crate::config::NodeConfig;

// ── Mode ─────────────────────────────────────────────────────────

/// Which pipelines the host drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Test pattern out to the transport.
    Send,
    /// Transport in to a software texture.
    Recv,
    /// Both, wired back-to-back over the loopback.
    Both,
}

// ── Host ─────────────────────────────────────────────────────────

/// Owns the runtime, the pipelines, and the per-tick render state.
pub struct Host {
    config: NodeConfig,
    transport: Arc<LoopbackTransport>,
    send: Option<SendPipeline>,
    receive: Option<ReceivePipeline>,
    bridge: SoftwareBridge,
    pattern: PatternGenerator,
    source_tex: Option<SoftwareTexture>,
    out_tex: Option<SoftwareTexture>,
}

impl Host {
    /// Bring the runtime up and open the requested pipelines.
    pub fn new(config: NodeConfig, mode: Mode) -> Result<Self, LinkError> {
        let transport = Arc::new(LoopbackTransport::new());
        let runtime = Runtime::new(Arc::<LoopbackTransport>::clone(&transport));
        if !runtime.is_initialized() {
            return Err(LinkError::TransportInit(
                "transport failed to initialize".into(),
            ));
        }
        info!(version = runtime.version(), "runtime ready");

        let mut send = matches!(mode, Mode::Send | Mode::Both)
            .then(|| runtime.send_pipeline(config.to_send_config()))
            .flatten();
        if let Some(send) = send.as_mut() {
            send.configure(&config.link.source_name);
        }

        let sources = transport.sources();
        info!(count = sources.len(), "discovered sources");
        for source in &sources {
            debug!(name = %source.display_name, address = %source.address, "source");
        }

        let mut receive = matches!(mode, Mode::Recv | Mode::Both)
            .then(|| runtime.receive_pipeline(config.to_receive_config()))
            .flatten();
        if let Some(receive) = receive.as_mut() {
            receive.connect(&config.link.source_name);
        }

        let pattern = PatternGenerator::new(config.pattern.width, config.pattern.height);
        Ok(Self {
            config,
            transport,
            send,
            receive,
            bridge: SoftwareBridge,
            pattern,
            source_tex: None,
            out_tex: None,
        })
    }

    /// Drive the tick loop for `duration`, then tear everything down.
    pub fn run(&mut self, duration: Duration) {
        let framerate = self.config.link.framerate.max(1);
        let tick_interval = Duration::from_secs_f64(1.0 / framerate as f64);
        let deadline = Instant::now() + duration;
        let mut last_report = Instant::now();

        while Instant::now() < deadline {
            let tick_start = Instant::now();
            self.tick();

            if last_report.elapsed() >= Duration::from_secs(1) {
                self.report();
                last_report = Instant::now();
            }

            let elapsed = tick_start.elapsed();
            if elapsed < tick_interval {
                std::thread::sleep(tick_interval - elapsed);
            }
        }
        self.shutdown();
    }

    /// One render tick: paint + submit on the send side, upload on the
    /// receive side.
    fn tick(&mut self) {
        if let Some(send) = self.send.as_mut() {
            let frame = self.pattern.next_frame();
            let desc = TextureDesc {
                width: self.config.pattern.width,
                height: self.config.pattern.height,
                format: PixelFormat::Bgra8,
            };
            if self.source_tex.as_ref().map(|t| self.bridge.desc(t)) != Some(desc) {
                match self.bridge.create(desc) {
                    Ok(tex) => self.source_tex = Some(tex),
                    Err(e) => {
                        error!(error = %e, "pattern texture creation failed");
                        return;
                    }
                }
            }
            if let Some(tex) = self.source_tex.as_mut() {
                match self.bridge.upload(tex, &frame) {
                    Ok(()) => send.submit(&mut self.bridge, tex, self.config.link.framerate),
                    Err(e) => error!(error = %e, "pattern upload failed"),
                }
            }
        }

        if let Some(receive) = self.receive.as_mut() {
            if let Err(e) = receive.upload(&mut self.bridge, &mut self.out_tex) {
                warn!(error = %e, "texture upload failed");
            }
        }
    }

    fn report(&self) {
        if let Some(send) = self.send.as_ref() {
            let connections = send
                .connection_count(Duration::from_millis(10))
                .unwrap_or(0);
            if connections == 0 {
                debug!("no receivers attached; frames are paced but not delivered");
            }
            info!(
                frames = self.pattern.frame_index(),
                pending = send.pending_frames(),
                connections,
                on_program = send.tally().on_program,
                "send"
            );
        }
        if let Some(receive) = self.receive.as_ref() {
            match receive.latest_desc() {
                Some(desc) => info!(
                    width = desc.width,
                    height = desc.height,
                    buffer = receive.buffer_capacity(),
                    "receive"
                ),
                None => info!("receive: no frame yet"),
            }
        }
    }

    /// Tear both pipelines down. Idempotent; also runs at the end of
    /// [`run`](Self::run).
    pub fn shutdown(&mut self) {
        if let Some(mut receive) = self.receive.take() {
            receive.disconnect();
        }
        if let Some(mut send) = self.send.take() {
            send.shutdown();
        }
        info!("pipelines torn down");
    }

    /// The in-process transport backing this host.
    pub fn transport(&self) -> &LoopbackTransport {
        &self.transport
    }
}

// ── Tests ────────────────────────────────────────────────────────
