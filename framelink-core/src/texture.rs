//! Texture bridge — the render-thread seam between frame buffers and
//! GPU texture resources.
//!
//! The pipelines never talk to a graphics API directly. The receive
//! side writes a frame's bytes into a texture through
//! [`TextureBridge::upload`]; the send side pulls a texture's bytes
//! back to the CPU through [`TextureBridge::readback`]. Both calls are
//! render-thread only. A host embedding the library supplies the real
//! GPU implementation; [`SoftwareBridge`] is the CPU-backed reference
//! used by the demo host and the tests.

use crate::error::LinkError;
use crate::frame::{PixelFormat, stride_for_width};

// ── TextureDesc ──────────────────────────────────────────────────

/// Shape of a texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub format: PixelFormat,
}

impl TextureDesc {
    /// Byte size of a tightly packed image of this shape.
    pub fn byte_len(&self) -> usize {
        stride_for_width(self.width) as usize * self.height as usize
    }
}

// ── TextureBridge ────────────────────────────────────────────────

/// Converts frame buffers to texture resources and back.
///
/// `readback` returns tightly packed rows (`stride == width * 4`);
/// implementations over APIs that pad row pitch resolve the padding
/// before returning.
pub trait TextureBridge {
    type Texture;

    /// Create a texture resource of the given shape.
    fn create(&mut self, desc: TextureDesc) -> Result<Self::Texture, LinkError>;

    /// Shape of an existing texture.
    fn desc(&self, texture: &Self::Texture) -> TextureDesc;

    /// Write `bytes` (tightly packed, `desc.byte_len()` long) into the
    /// texture.
    fn upload(&mut self, texture: &mut Self::Texture, bytes: &[u8]) -> Result<(), LinkError>;

    /// Copy the texture's pixels back to CPU memory and return the
    /// mapped bytes.
    fn readback<'a>(&'a mut self, texture: &'a Self::Texture) -> Result<&'a [u8], LinkError>;
}

// ── SoftwareBridge ───────────────────────────────────────────────

/// A plain CPU-memory texture.
#[derive(Debug, Clone)]
pub struct SoftwareTexture {
    desc: TextureDesc,
    data: Vec<u8>,
}

impl SoftwareTexture {
    /// Shape of the texture.
    pub fn desc(&self) -> TextureDesc {
        self.desc
    }

    /// Raw pixel bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

/// CPU-backed [`TextureBridge`] implementation.
#[derive(Debug, Default)]
pub struct SoftwareBridge;

impl TextureBridge for SoftwareBridge {
    type Texture = SoftwareTexture;

    fn create(&mut self, desc: TextureDesc) -> Result<SoftwareTexture, LinkError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(LinkError::Texture(format!(
                "degenerate texture shape {}x{}",
                desc.width, desc.height
            )));
        }
        Ok(SoftwareTexture {
            desc,
            data: vec![0u8; desc.byte_len()],
        })
    }

    fn desc(&self, texture: &SoftwareTexture) -> TextureDesc {
        texture.desc
    }

    fn upload(&mut self, texture: &mut SoftwareTexture, bytes: &[u8]) -> Result<(), LinkError> {
        if bytes.len() != texture.data.len() {
            return Err(LinkError::BufferLength {
                expected: texture.data.len(),
                actual: bytes.len(),
            });
        }
        texture.data.copy_from_slice(bytes);
        Ok(())
    }

    fn readback<'a>(&'a mut self, texture: &'a SoftwareTexture) -> Result<&'a [u8], LinkError> {
        Ok(&texture.data)
    }
}

// ── Tests ────────────────────────────────────────────────────────
