//! Plugin-host glue: one-time transport initialization and instance
//! health.
//!
//! A host creates one [`Runtime`] per plugin instance. Initialization
//! failure (e.g. an unsupported CPU) is fatal to the instance: the
//! runtime reports `initialized == false`, pipelines cannot be
//! created, and nothing is retried. The version string and the
//! initialized flag are the only externally observable health signals
//! — every other failure is log-only.

use std::sync::Arc;

use tracing::{error, info};

use crate::recv::{ReceiveConfig, ReceivePipeline};
use crate::send::{SendConfig, SendPipeline};
use crate::transport::Transport;

// ── Runtime ──────────────────────────────────────────────────────

/// Per-instance wrapper around a transport library.
pub struct Runtime {
    transport: Arc<dyn Transport>,
    initialized: bool,
    version: String,
}

impl Runtime {
    /// Initialize the transport once. Failure leaves the runtime
    /// unusable but constructed, so the host can still read the
    /// health flag and version.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let version = transport.version();
        let initialized = match transport.initialize() {
            Ok(()) => {
                info!(version = %version, "transport initialized");
                true
            }
            Err(e) => {
                error!(error = %e, "transport initialization failed");
                false
            }
        };
        Self {
            transport,
            initialized,
            version,
        }
    }

    /// Whether the transport came up. `false` is permanent.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Transport library version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Create a receive pipeline, or `None` on an uninitialized
    /// runtime.
    pub fn receive_pipeline(&self, config: ReceiveConfig) -> Option<ReceivePipeline> {
        self.initialized
            .then(|| ReceivePipeline::new(Arc::clone(&self.transport), config))
    }

    /// Create a send pipeline, or `None` on an uninitialized runtime.
    pub fn send_pipeline(&self, config: SendConfig) -> Option<SendPipeline> {
        self.initialized
            .then(|| SendPipeline::new(Arc::clone(&self.transport), config))
    }
}

// ── Tests ────────────────────────────────────────────────────────
