//! # framelink-core
//!
//! Frame hand-off machinery for streaming uncompressed video between a
//! render host's texture pipeline and a network video transport, in
//! both directions.
//!
//! This crate contains:
//! - **Frames**: `FrameBuffer`, `PixelFormat`, stride math, and the
//!   R↔B channel-swap conversion
//! - **Transport boundary**: `Transport`, `ReceiverHandle`,
//!   `SenderHandle` — the opaque, blocking SDK seam, plus an
//!   in-process `LoopbackTransport`
//! - **Receive**: `ReceivePipeline` — capture thread feeding a single
//!   lock-guarded latest-frame slot, uploaded per render tick
//! - **Send**: `SendPipeline` — per-tick texture readback into a
//!   bounded pending queue, drained by a transmit thread that keeps
//!   only the newest frame under backpressure
//! - **Texture bridge**: `TextureBridge` — the render-thread seam to
//!   GPU resources, with a CPU-backed `SoftwareBridge`
//! - **Discovery**: `SourceDiscovery` — endpoint enumeration
//! - **Runtime**: per-instance transport initialization and health
//! - **Error**: `LinkError` — typed, `thiserror`-based error hierarchy
//!
//! Both pipelines are built on plain OS threads: one background thread
//! per active pipeline, an exit flag checked every loop iteration, and
//! teardown that always runs set-flag → join → destroy-resource. Both
//! are deliberately lossy under load — the freshest frame wins and
//! producers never block — trading completeness for bounded latency.

pub mod discovery;
pub mod error;
pub mod frame;
pub mod pattern;
pub mod recv;
pub mod runtime;
pub mod send;
pub mod state;
pub mod texture;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use discovery::{Source, SourceDiscovery};
pub use error::LinkError;
pub use frame::{FrameBuffer, PixelFormat, stride_for_width, swap_red_blue};
pub use recv::{ReceiveConfig, ReceivePipeline};
pub use runtime::Runtime;
pub use send::{SendConfig, SendPipeline};
pub use state::PipelineState;
pub use texture::{SoftwareBridge, SoftwareTexture, TextureBridge, TextureDesc};
pub use transport::loopback::LoopbackTransport;
pub use transport::{
    Bandwidth, CaptureEvent, CapturedFrame, CapturedPayload, OutboundFrame, ReceiverHandle,
    ReceiverRequest, SenderHandle, SenderRequest, Tally, Timecode, Transport,
};
