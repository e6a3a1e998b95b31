// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Texture identities and texel sizes.
//!
//! A readback never touches a texture directly. Callers name a texture with an
//! opaque [`TextureHandle`] that the copy engine resolves on the render thread,
//! the same way native graphics plugins resolve a host texture pointer to an
//! API object.
//!
//! The size of a readback is fully determined by the texel format and the
//! extent of the requested mip level:
//!
//! ```
//! use async_gpu_readback::texture::{TexelFormat, TextureDescriptor};
//!
//! let descriptor = TextureDescriptor::new_2d(64, 32, TexelFormat::Rgba8Unorm);
//! assert_eq!(descriptor.staging_len(0), Some(64 * 32 * 4));
//! ```

/// Opaque identity of a GPU texture, resolved by a copy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(u64);

impl TextureHandle {
    pub const fn new(raw: u64) -> Self {
        TextureHandle(raw)
    }
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Texel layouts a readback can produce.
///
/// Block-compressed formats are listed so that engines can name them, but they
/// have no per-texel size and cannot be read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TexelFormat {
    R8Unorm,
    R8Snorm,
    R8Uint,
    R16Unorm,
    R16Float,
    R16Uint,
    R32Float,
    R32Uint,
    R32Sint,
    Rg8Unorm,
    Rg16Float,
    Rg32Float,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgb10a2Unorm,
    Rg11b10Float,
    Rgba16Unorm,
    Rgba16Float,
    Rgba32Float,
    Rgba32Uint,
    Depth16Unorm,
    Depth32Float,
    Bc1RgbaUnorm,
    Bc3RgbaUnorm,
    Bc7RgbaUnorm,
}

impl TexelFormat {
    /// Bytes occupied by one texel, or `None` for block-compressed formats.
    pub const fn bytes_per_texel(self) -> Option<u32> {
        use TexelFormat::*;
        match self {
            R8Unorm | R8Snorm | R8Uint => Some(1),
            R16Unorm | R16Float | R16Uint | Rg8Unorm | Depth16Unorm => Some(2),
            R32Float | R32Uint | R32Sint | Rg16Float | Rgba8Unorm | Rgba8UnormSrgb
            | Bgra8Unorm | Bgra8UnormSrgb | Rgb10a2Unorm | Rg11b10Float | Depth32Float => Some(4),
            Rg32Float | Rgba16Unorm | Rgba16Float => Some(8),
            Rgba32Float | Rgba32Uint => Some(16),
            Bc1RgbaUnorm | Bc3RgbaUnorm | Bc7RgbaUnorm => None,
        }
    }

    pub const fn is_compressed(self) -> bool {
        self.bytes_per_texel().is_none()
    }
}

/// Shape of a texture as seen by a copy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: TexelFormat,
    pub mip_level_count: u32,
}

impl TextureDescriptor {
    /// A single-level 2D texture.
    pub const fn new_2d(width: u32, height: u32, format: TexelFormat) -> Self {
        TextureDescriptor {
            width,
            height,
            depth: 1,
            format,
            mip_level_count: 1,
        }
    }

    /// Extent of `mip_level`, or `None` if the texture has no such level.
    pub fn level_extent(&self, mip_level: u32) -> Option<(u32, u32, u32)> {
        if mip_level >= self.mip_level_count || mip_level >= u32::BITS {
            return None;
        }
        let shrink = |v: u32| if v == 0 { 0 } else { (v >> mip_level).max(1) };
        Some((shrink(self.width), shrink(self.height), shrink(self.depth)))
    }

    /// Tightly packed byte length of `mip_level`.
    ///
    /// `None` when the level does not exist or the format has no texel size.
    /// A zero-sized texture yields `Some(0)`, which engines treat as a failed copy.
    pub fn staging_len(&self, mip_level: u32) -> Option<usize> {
        let bpp = self.format.bytes_per_texel()? as usize;
        let (w, h, d) = self.level_extent(mip_level)?;
        (w as usize)
            .checked_mul(h as usize)?
            .checked_mul(d as usize)?
            .checked_mul(bpp)
    }
}
