//! Source discovery — enumerating the remote endpoints a receive
//! pipeline can attach to.
//!
//! Out of the core pipeline scope; the pipelines only consume the
//! resulting endpoint names. The loopback transport implements this
//! trait over its in-process registry.

use serde::{Deserialize, Serialize};

// ── Source ───────────────────────────────────────────────────────

/// One discoverable remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Human-readable name, as shown in a source browser.
    pub display_name: String,
    /// Transport-level address of the endpoint.
    pub address: String,
}

// ── SourceDiscovery ──────────────────────────────────────────────

/// Produces the current list of reachable sources on demand.
pub trait SourceDiscovery {
    fn sources(&self) -> Vec<Source>;
}
