//! Shared frame types for the receive/send pipelines.
//!
//! A [`FrameBuffer`] is the single unit of hand-off between threads: an
//! owned block of pixel memory plus the layout metadata needed to
//! interpret it. Ownership is exclusive to whichever stage currently
//! holds the buffer (capture thread while filling, queue while in
//! transit, render thread while converting) and transfers as a move.

use std::time::Instant;

use crate::error::LinkError;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for uncompressed 32-bit frames.
///
/// The pipelines carry exactly one of these per session — there is no
/// per-frame format negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 4 bytes per pixel: Blue, Green, Red, Alpha.
    #[default]
    Bgra8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        4
    }

    /// The format with R and B exchanged (see [`swap_red_blue`]).
    pub const fn swapped(self) -> Self {
        match self {
            PixelFormat::Bgra8 => PixelFormat::Rgba8,
            PixelFormat::Rgba8 => PixelFormat::Bgra8,
        }
    }
}

/// Row stride in bytes for a tightly packed 32-bit frame of `width`
/// pixels.
pub const fn stride_for_width(width: u32) -> u32 {
    (width * 32 + 7) / 8
}

// ── FrameBuffer ──────────────────────────────────────────────────

/// An owned, size-tagged block of pixel memory.
///
/// The `data` buffer holds `height` rows of `stride` bytes each.
/// Invariants: `stride >= width * 4` and `data.len() == stride *
/// height`. `stride` may exceed `width * 4` when the producer pads
/// rows to an alignment boundary.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Row pitch in **bytes** (may exceed `width * 4`).
    pub stride: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Picture aspect ratio (`width / height` unless anamorphic).
    pub aspect_ratio: f32,
    /// Raw pixel data — `stride * height` bytes.
    pub data: Vec<u8>,
    /// Monotonic arrival timestamp.
    pub timestamp: Instant,
}

impl FrameBuffer {
    /// An empty 0×0 buffer, used as the initial slot contents before
    /// any frame has arrived.
    pub fn empty(format: PixelFormat) -> Self {
        Self {
            width: 0,
            height: 0,
            stride: 0,
            format,
            aspect_ratio: 0.0,
            data: Vec::new(),
            timestamp: Instant::now(),
        }
    }

    /// Total byte size the bitmap occupies (`stride * height`).
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    /// Returns a row slice (including possible padding bytes).
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride as usize;
        let end = start + self.stride as usize;
        &self.data[start..end]
    }

    /// Replace the backing allocation with one of exactly `len` bytes.
    ///
    /// No-op when the current length already matches. Contents are not
    /// preserved — callers overwrite the whole buffer after resizing.
    pub fn realloc_exact(&mut self, len: usize) {
        if self.data.len() != len {
            self.data = vec![0u8; len];
        }
    }

    /// Check the layout invariants against the current metadata.
    pub fn validate(&self) -> Result<(), LinkError> {
        let min_stride = self.width as usize * self.format.bytes_per_pixel();
        if (self.stride as usize) < min_stride {
            return Err(LinkError::InvalidGeometry {
                width: self.width,
                height: self.height,
                stride: self.stride,
            });
        }
        if self.data.len() != self.byte_len() {
            return Err(LinkError::BufferLength {
                expected: self.byte_len(),
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

// ── Channel conversion ───────────────────────────────────────────

/// Swap the R and B channels of every pixel in place.
///
/// A straight 4-byte-stride element-wise swap (G and A untouched), not
/// a colorspace transform; converts RGBA rows to BGRA order and vice
/// versa. Applying it twice restores the original bytes. A trailing
/// partial pixel (length not a multiple of 4) is left untouched.
pub fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn filled(width: u32, height: u32, byte: u8) -> FrameBuffer {
        let stride = stride_for_width(width);
        FrameBuffer {
            width,
            height,
            stride,
            format: PixelFormat::Bgra8,
            aspect_ratio: width as f32 / height as f32,
            data: vec![byte; (stride * height) as usize],
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn stride_matches_32bpp() {
        assert_eq!(stride_for_width(1920), 7680);
        assert_eq!(stride_for_width(640), 2560);
        assert_eq!(stride_for_width(0), 0);
    }

    #[test]
    fn byte_len_full_hd() {
        let frame = filled(1920, 1080, 0);
        assert_eq!(frame.byte_len(), 8_294_400);
        frame.validate().unwrap();
    }

    #[test]
    fn realloc_is_exact() {
        let mut frame = filled(1920, 1080, 0);
        frame.realloc_exact(921_600);
        assert_eq!(frame.data.len(), 921_600);
        // unchanged length keeps the allocation
        frame.realloc_exact(921_600);
        assert_eq!(frame.data.len(), 921_600);
    }

    #[test]
    fn validate_rejects_short_stride() {
        let mut frame = filled(16, 4, 0);
        frame.stride = 15; // < 16 * 4
        assert!(matches!(
            frame.validate(),
            Err(LinkError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn validate_rejects_length_mismatch() {
        let mut frame = filled(16, 4, 0);
        frame.data.truncate(10);
        assert!(matches!(
            frame.validate(),
            Err(LinkError::BufferLength { .. })
        ));
    }

    #[test]
    fn swap_exchanges_r_and_b() {
        let mut px = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        swap_red_blue(&mut px);
        assert_eq!(px, vec![3, 2, 1, 4, 7, 6, 5, 8]);
    }

    proptest! {
        #[test]
        fn swap_is_its_own_inverse(data in proptest::collection::vec(any::<u8>(), 0..1024)) {
            let mut buf = data.clone();
            swap_red_blue(&mut buf);
            swap_red_blue(&mut buf);
            prop_assert_eq!(buf, data);
        }

        #[test]
        fn stride_is_always_four_bytes_per_pixel(width in 0u32..100_000) {
            prop_assert_eq!(stride_for_width(width), width * 4);
        }
    }
}
