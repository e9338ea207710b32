//! In-process loopback transport.
//!
//! Connects senders and receivers registered under the same endpoint
//! name through bounded in-process channels — no sockets, no wire
//! format. Used by the demo host and by tests that need a real
//! [`Transport`] without hardware or a network.
//!
//! Delivery is lossy by design: a receiver that falls behind loses
//! frames rather than applying backpressure to the sender, matching
//! the latency-over-completeness contract of the real SDK boundary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::discovery::{Source, SourceDiscovery};
use crate::error::LinkError;
use crate::transport::{
    CaptureEvent, CapturedFrame, OutboundFrame, ReceiverHandle, ReceiverRequest, SenderHandle,
    SenderRequest, Tally, Timecode, Transport,
};

/// Frames buffered per receiver before delivery becomes lossy.
const CHANNEL_CAPACITY: usize = 2;

// ── Hub ──────────────────────────────────────────────────────────

/// Shared registry of endpoint names and their attached peers.
struct Hub {
    sources: Mutex<HashMap<String, SourceSlot>>,
}

impl Hub {
    /// Lock the registry, recovering from a poisoned lock — every
    /// holder is short-lived and leaves the map consistent.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SourceSlot>> {
        match self.sources.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[derive(Default)]
struct SourceSlot {
    /// One entry per attached receiver, keyed for removal on drop.
    subscribers: Vec<(u64, Sender<CapturedFrame>)>,
    /// Last tally reported by any receiver of this source.
    tally: Tally,
    /// Whether a send session currently owns this name.
    sender_live: bool,
    /// Monotonic submission counter, doubles as the synthesized
    /// timestamp.
    sequence: i64,
    next_subscriber_id: u64,
}

// ── LoopbackTransport ────────────────────────────────────────────

/// An in-process [`Transport`] implementation.
///
/// Clones share the same hub, so a sender created from one clone is
/// visible to receivers created from another.
#[derive(Clone)]
pub struct LoopbackTransport {
    hub: Arc<Hub>,
    supported: bool,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            hub: Arc::new(Hub {
                sources: Mutex::new(HashMap::new()),
            }),
            supported: true,
        }
    }

    /// A transport whose `initialize` always fails, for exercising the
    /// fatal-to-instance path.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// Number of receivers currently attached to `source_name`.
    pub fn live_receivers(&self, source_name: &str) -> usize {
        let sources = self.hub.lock();
        sources
            .get(source_name)
            .map(|slot| slot.subscribers.len())
            .unwrap_or(0)
    }

    /// Whether a send session currently owns `source_name`.
    pub fn sender_live(&self, source_name: &str) -> bool {
        let sources = self.hub.lock();
        sources.get(source_name).is_some_and(|slot| slot.sender_live)
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LoopbackTransport {
    fn initialize(&self) -> Result<(), LinkError> {
        if self.supported {
            Ok(())
        } else {
            Err(LinkError::TransportInit(
                "loopback transport marked unsupported".into(),
            ))
        }
    }

    fn version(&self) -> String {
        format!("loopback {}", env!("CARGO_PKG_VERSION"))
    }

    fn create_receiver(&self, request: &ReceiverRequest) -> Option<Box<dyn ReceiverHandle>> {
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let mut sources = self.hub.lock();
        let slot = sources.entry(request.source_name.clone()).or_default();
        let id = slot.next_subscriber_id;
        slot.next_subscriber_id += 1;
        slot.subscribers.push((id, tx));
        Some(Box::new(LoopbackReceiver {
            hub: Arc::clone(&self.hub),
            source_name: request.source_name.clone(),
            id,
            rx,
        }))
    }

    fn create_sender(&self, request: &SenderRequest) -> Option<Box<dyn SenderHandle>> {
        let mut sources = self.hub.lock();
        let slot = sources.entry(request.source_name.clone()).or_default();
        if slot.sender_live {
            // name collision: the SDK returns a null handle
            return None;
        }
        slot.sender_live = true;
        Some(Box::new(LoopbackSender {
            hub: Arc::clone(&self.hub),
            source_name: request.source_name.clone(),
        }))
    }
}

impl SourceDiscovery for LoopbackTransport {
    fn sources(&self) -> Vec<Source> {
        let sources = self.hub.lock();
        let mut found: Vec<Source> = sources
            .iter()
            .filter(|(_, slot)| slot.sender_live)
            .map(|(name, _)| Source {
                display_name: name.clone(),
                address: format!("loopback://{name}"),
            })
            .collect();
        found.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        found
    }
}

// ── LoopbackReceiver ─────────────────────────────────────────────

struct LoopbackReceiver {
    hub: Arc<Hub>,
    source_name: String,
    id: u64,
    rx: Receiver<CapturedFrame>,
}

impl ReceiverHandle for LoopbackReceiver {
    fn capture(&mut self, timeout: Duration) -> CaptureEvent {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => CaptureEvent::Video(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                CaptureEvent::None
            }
        }
    }

    fn set_tally(&mut self, tally: Tally) {
        if let Some(slot) = self.hub.lock().get_mut(&self.source_name) {
            slot.tally = tally;
        }
    }
}

impl Drop for LoopbackReceiver {
    fn drop(&mut self) {
        if let Some(slot) = self.hub.lock().get_mut(&self.source_name) {
            slot.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

// ── LoopbackSender ───────────────────────────────────────────────

struct LoopbackSender {
    hub: Arc<Hub>,
    source_name: String,
}

impl SenderHandle for LoopbackSender {
    fn submit(&mut self, frame: &OutboundFrame) {
        let mut sources = self.hub.lock();
        let Some(slot) = sources.get_mut(&self.source_name) else {
            return;
        };
        slot.sequence += 1;
        let timestamp_us = match frame.timecode {
            Timecode::Synthesize => slot.sequence,
            Timecode::At(t) => t,
        };
        let captured = CapturedFrame {
            width: frame.width,
            height: frame.height,
            stride: frame.stride,
            format: frame.format,
            aspect_ratio: frame.aspect_ratio,
            timestamp_us,
            data: Bytes::copy_from_slice(&frame.data),
        };
        // lossy fan-out: a full subscriber queue drops this frame for
        // that receiver only
        slot.subscribers
            .retain(|(_, tx)| match tx.try_send(captured.clone()) {
                Ok(()) => true,
                Err(crossbeam_channel::TrySendError::Full(_)) => true,
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
            });
    }

    fn connection_count(&mut self, _timeout: Duration) -> usize {
        let sources = self.hub.lock();
        sources
            .get(&self.source_name)
            .map(|slot| slot.subscribers.len())
            .unwrap_or(0)
    }

    fn tally(&mut self) -> Tally {
        let sources = self.hub.lock();
        sources
            .get(&self.source_name)
            .map(|slot| slot.tally)
            .unwrap_or_default()
    }
}

impl Drop for LoopbackSender {
    fn drop(&mut self) {
        if let Some(slot) = self.hub.lock().get_mut(&self.source_name) {
            slot.sender_live = false;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{PixelFormat, stride_for_width};

    fn receiver_request(name: &str) -> ReceiverRequest {
        ReceiverRequest {
            source_name: name.into(),
            receiver_label: None,
            format: PixelFormat::Bgra8,
            bandwidth: Default::default(),
            allow_fielded: false,
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

    fn outbound(width: u32, height: u32, byte: u8) -> OutboundFrame {
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

    #[test]
    fn frame_roundtrip() {
        let transport = LoopbackTransport::new();
        let mut sender = transport.create_sender(&sender_request("Cam 1")).unwrap();
        let mut receiver = transport
            .create_receiver(&receiver_request("Cam 1"))
            .unwrap();

        sender.submit(&outbound(64, 48, 0xAB));

        match receiver.capture(Duration::from_millis(250)) {
            CaptureEvent::Video(frame) => {
                assert_eq!(frame.width, 64);
                assert_eq!(frame.height, 48);
                assert_eq!(frame.stride, 256);
                assert_eq!(frame.timestamp_us, 1);
                assert_eq!(frame.data.len(), frame.byte_len());
                assert!(frame.data.iter().all(|&b| b == 0xAB));
            }
            _ => panic!("expected a video frame"),
        }
    }

    #[test]
    fn capture_times_out_without_traffic() {
        let transport = LoopbackTransport::new();
        let mut receiver = transport
            .create_receiver(&receiver_request("Silent"))
            .unwrap();
        assert!(matches!(
            receiver.capture(Duration::from_millis(10)),
            CaptureEvent::None
        ));
    }

    #[test]
    fn tally_reaches_the_sender() {
        let transport = LoopbackTransport::new();
        let mut sender = transport.create_sender(&sender_request("Cam 1")).unwrap();
        let mut receiver = transport
            .create_receiver(&receiver_request("Cam 1"))
            .unwrap();

        assert_eq!(sender.tally(), Tally::default());
        receiver.set_tally(Tally {
            on_program: true,
            on_preview: false,
        });
        assert!(sender.tally().on_program);
    }

    #[test]
    fn connection_count_tracks_receivers() {
        let transport = LoopbackTransport::new();
        let mut sender = transport.create_sender(&sender_request("Cam 1")).unwrap();
        assert_eq!(sender.connection_count(Duration::ZERO), 0);

        let receiver = transport
            .create_receiver(&receiver_request("Cam 1"))
            .unwrap();
        assert_eq!(sender.connection_count(Duration::ZERO), 1);

        drop(receiver);
        assert_eq!(sender.connection_count(Duration::ZERO), 0);
    }

    #[test]
    fn duplicate_sender_name_is_refused() {
        let transport = LoopbackTransport::new();
        let _first = transport.create_sender(&sender_request("Cam 1")).unwrap();
        assert!(transport.create_sender(&sender_request("Cam 1")).is_none());
    }

    #[test]
    fn dropped_sender_frees_the_name() {
        let transport = LoopbackTransport::new();
        let first = transport.create_sender(&sender_request("Cam 1")).unwrap();
        drop(first);
        assert!(transport.create_sender(&sender_request("Cam 1")).is_some());
    }

    #[test]
    fn discovery_lists_live_senders() {
        let transport = LoopbackTransport::new();
        let _a = transport.create_sender(&sender_request("Cam B")).unwrap();
        let _b = transport.create_sender(&sender_request("Cam A")).unwrap();

        let sources = transport.sources();
        let names: Vec<&str> = sources.iter().map(|s| s.display_name.as_str()).collect();
        assert_eq!(names, vec!["Cam A", "Cam B"]);
        assert_eq!(sources[0].address, "loopback://Cam A");
    }
}
