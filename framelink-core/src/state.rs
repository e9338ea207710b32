//! Pipeline lifecycle state shared by the receive and send sides.

// ── PipelineState ────────────────────────────────────────────────

/// The current phase of a pipeline instance.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected
///       ▲                │             │
///       │                ▼             ▼
///       └───────── ShuttingDown ◄──────┘
/// ```
///
/// Transitions are driven by endpoint-identity changes and explicit
/// teardown; every path back to `Disconnected` goes through the
/// pipeline's single disconnect routine, which joins the background
/// thread before the connection handle is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// No active session. Initial / terminal state.
    #[default]
    Disconnected,

    /// A session request is being issued to the transport.
    Connecting,

    /// Session open; the background thread is running.
    Connected,

    /// Teardown in progress: exit flag set, thread being joined.
    ShuttingDown,
}

impl PipelineState {
    /// Returns `true` when a session is open and frames may flow.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connected_reports_connected() {
        assert!(PipelineState::Connected.is_connected());
        assert!(!PipelineState::Disconnected.is_connected());
        assert!(!PipelineState::Connecting.is_connected());
        assert!(!PipelineState::ShuttingDown.is_connected());
    }

    #[test]
    fn default_is_disconnected() {
        assert_eq!(PipelineState::default(), PipelineState::Disconnected);
    }
}
