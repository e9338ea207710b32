//! Domain-specific error types for the framelink pipelines.
//!
//! All fallible operations return `Result<T, LinkError>`.
//! Background threads never propagate these — failures inside a capture
//! or transmit loop are logged and contained locally.

use thiserror::Error;

/// The canonical error type for the framelink crate.
#[derive(Debug, Error)]
pub enum LinkError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The transport library failed to initialize. Fatal to the
    /// instance: the runtime never becomes usable and is not retried.
    #[error("transport initialization failed: {0}")]
    TransportInit(String),

    // ── Frame Errors ─────────────────────────────────────────────
    /// A frame's dimensions or row stride violate the layout
    /// invariants (`stride >= width * 4`, both dimensions non-zero).
    #[error("invalid frame geometry: {width}x{height}, stride {stride}")]
    InvalidGeometry { width: u32, height: u32, stride: u32 },

    /// A pixel buffer is shorter or longer than its geometry implies.
    #[error("frame buffer length mismatch: expected {expected}, got {actual}")]
    BufferLength { expected: usize, actual: usize },

    // ── Texture Bridge Errors ────────────────────────────────────
    /// Texture creation, upload, or readback failed on the render
    /// thread. Per-frame: the current frame is dropped, the pipeline
    /// continues.
    #[error("texture bridge error: {0}")]
    Texture(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for LinkError {
    fn from(s: String) -> Self {
        LinkError::Other(s)
    }
}

impl From<&str> for LinkError {
    fn from(s: &str) -> Self {
        LinkError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = LinkError::InvalidGeometry {
            width: 4,
            height: 0,
            stride: 16,
        };
        assert!(e.to_string().contains("4x0"));

        let e = LinkError::BufferLength {
            expected: 8000,
            actual: 100,
        };
        assert!(e.to_string().contains("8000"));
        assert!(e.to_string().contains("100"));
    }

    #[test]
    fn from_string() {
        let e: LinkError = "something broke".into();
        assert!(matches!(e, LinkError::Other(_)));
    }
}
