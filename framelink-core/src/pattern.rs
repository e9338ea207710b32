//! Synthetic test-pattern source.
//!
//! Paints a deterministic BGRA frame per tick: a solid background, a
//! vertical bar that advances one pixel per frame, and the frame
//! counter embedded in the first eight bytes of row zero. The demo
//! host feeds these frames into the send pipeline; tests use the
//! embedded counter to tell frames apart.

use crate::frame::stride_for_width;

/// Background fill, BGRA (maroon).
const BACKGROUND: [u8; 4] = [0x00, 0x00, 0x80, 0xFF];
/// Moving-bar fill, BGRA (white).
const BAR: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

// ── PatternGenerator ─────────────────────────────────────────────

/// Stateful generator producing one frame per call.
pub struct PatternGenerator {
    width: u32,
    height: u32,
    frame_index: u64,
}

impl PatternGenerator {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_index: 0,
        }
    }

    /// Frames produced so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Paint the next frame as tightly packed BGRA rows.
    pub fn next_frame(&mut self) -> Vec<u8> {
        let stride = stride_for_width(self.width) as usize;
        let mut data = vec![0u8; stride * self.height as usize];

        let bar_x = if self.width > 0 {
            (self.frame_index % self.width as u64) as usize
        } else {
            0
        };

        for y in 0..self.height as usize {
            let row = &mut data[y * stride..(y + 1) * stride];
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                px.copy_from_slice(if x == bar_x { &BAR } else { &BACKGROUND });
            }
        }

        // frame counter marker in the first two pixels of row zero
        if data.len() >= 8 {
            data[..8].copy_from_slice(&self.frame_index.to_le_bytes());
        }

        self.frame_index += 1;
        data
    }
}

/// Read the counter marker back out of a pattern frame.
pub fn frame_counter(data: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = data.get(..8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_advances_per_frame() {
        let mut pattern = PatternGenerator::new(64, 8);
        let first = pattern.next_frame();
        let second = pattern.next_frame();
        assert_eq!(frame_counter(&first), Some(0));
        assert_eq!(frame_counter(&second), Some(1));
        assert_eq!(pattern.frame_index(), 2);
    }

    #[test]
    fn bar_moves_one_pixel_per_frame() {
        let mut pattern = PatternGenerator::new(16, 2);
        let first = pattern.next_frame();
        let second = pattern.next_frame();

        // row 1 is free of the counter marker
        let row = |data: &[u8], x: usize| {
            let stride = stride_for_width(16) as usize;
            data[stride + x * 4..stride + x * 4 + 4].to_vec()
        };
        assert_eq!(row(&first, 0), BAR.to_vec());
        assert_eq!(row(&first, 1), BACKGROUND.to_vec());
        assert_eq!(row(&second, 1), BAR.to_vec());
    }

    #[test]
    fn frame_is_tightly_packed() {
        let mut pattern = PatternGenerator::new(33, 7);
        let data = pattern.next_frame();
        assert_eq!(data.len(), 33 * 4 * 7);
    }
}
