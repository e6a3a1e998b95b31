// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::texture::TexelFormat;

impl TexelFormat {
    /// The texel format of a wgpu texture, if it is one readbacks know about.
    pub fn from_wgpu(format: wgpu::TextureFormat) -> Option<Self> {
        use wgpu::TextureFormat as W;
        Some(match format {
            W::R8Unorm => TexelFormat::R8Unorm,
            W::R8Snorm => TexelFormat::R8Snorm,
            W::R8Uint => TexelFormat::R8Uint,
            W::R16Unorm => TexelFormat::R16Unorm,
            W::R16Float => TexelFormat::R16Float,
            W::R16Uint => TexelFormat::R16Uint,
            W::R32Float => TexelFormat::R32Float,
            W::R32Uint => TexelFormat::R32Uint,
            W::R32Sint => TexelFormat::R32Sint,
            W::Rg8Unorm => TexelFormat::Rg8Unorm,
            W::Rg16Float => TexelFormat::Rg16Float,
            W::Rg32Float => TexelFormat::Rg32Float,
            W::Rgba8Unorm => TexelFormat::Rgba8Unorm,
            W::Rgba8UnormSrgb => TexelFormat::Rgba8UnormSrgb,
            W::Bgra8Unorm => TexelFormat::Bgra8Unorm,
            W::Bgra8UnormSrgb => TexelFormat::Bgra8UnormSrgb,
            W::Rgb10a2Unorm => TexelFormat::Rgb10a2Unorm,
            W::Rg11b10Ufloat => TexelFormat::Rg11b10Float,
            W::Rgba16Unorm => TexelFormat::Rgba16Unorm,
            W::Rgba16Float => TexelFormat::Rgba16Float,
            W::Rgba32Float => TexelFormat::Rgba32Float,
            W::Rgba32Uint => TexelFormat::Rgba32Uint,
            W::Depth16Unorm => TexelFormat::Depth16Unorm,
            W::Depth32Float => TexelFormat::Depth32Float,
            W::Bc1RgbaUnorm => TexelFormat::Bc1RgbaUnorm,
            W::Bc3RgbaUnorm => TexelFormat::Bc3RgbaUnorm,
            W::Bc7RgbaUnorm => TexelFormat::Bc7RgbaUnorm,
            _ => return None,
        })
    }

    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        use wgpu::TextureFormat as W;
        match self {
            TexelFormat::R8Unorm => W::R8Unorm,
            TexelFormat::R8Snorm => W::R8Snorm,
            TexelFormat::R8Uint => W::R8Uint,
            TexelFormat::R16Unorm => W::R16Unorm,
            TexelFormat::R16Float => W::R16Float,
            TexelFormat::R16Uint => W::R16Uint,
            TexelFormat::R32Float => W::R32Float,
            TexelFormat::R32Uint => W::R32Uint,
            TexelFormat::R32Sint => W::R32Sint,
            TexelFormat::Rg8Unorm => W::Rg8Unorm,
            TexelFormat::Rg16Float => W::Rg16Float,
            TexelFormat::Rg32Float => W::Rg32Float,
            TexelFormat::Rgba8Unorm => W::Rgba8Unorm,
            TexelFormat::Rgba8UnormSrgb => W::Rgba8UnormSrgb,
            TexelFormat::Bgra8Unorm => W::Bgra8Unorm,
            TexelFormat::Bgra8UnormSrgb => W::Bgra8UnormSrgb,
            TexelFormat::Rgb10a2Unorm => W::Rgb10a2Unorm,
            TexelFormat::Rg11b10Float => W::Rg11b10Ufloat,
            TexelFormat::Rgba16Unorm => W::Rgba16Unorm,
            TexelFormat::Rgba16Float => W::Rgba16Float,
            TexelFormat::Rgba32Float => W::Rgba32Float,
            TexelFormat::Rgba32Uint => W::Rgba32Uint,
            TexelFormat::Depth16Unorm => W::Depth16Unorm,
            TexelFormat::Depth32Float => W::Depth32Float,
            TexelFormat::Bc1RgbaUnorm => W::Bc1RgbaUnorm,
            TexelFormat::Bc3RgbaUnorm => W::Bc3RgbaUnorm,
            TexelFormat::Bc7RgbaUnorm => W::Bc7RgbaUnorm,
        }
    }
}
