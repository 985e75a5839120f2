//! Texture descriptors.
//!
//! Descriptors are backend-agnostic: the allocator compares them to detect
//! configuration changes, and backends translate them into device textures.

use bitflags::bitflags;

/// Storage format of a post-processing texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexFormat {
    /// Packed unsigned float RGB (11/11/10 bits). Used for most color chains.
    Rgb11,
    /// Half-float RGBA.
    Rgba16,
    /// Half-float RG.
    Rg16,
    /// 32-bit float depth.
    Depth,
}

impl TexFormat {
    #[inline]
    #[must_use]
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth)
    }

    /// Device format. `Rgb11` widens to `Rgba16Float` on adapters that cannot
    /// render to packed floats.
    #[must_use]
    pub fn to_wgpu(self, rg11b10_renderable: bool) -> wgpu::TextureFormat {
        match self {
            Self::Rgb11 if rg11b10_renderable => wgpu::TextureFormat::Rg11b10Ufloat,
            Self::Rgb11 | Self::Rgba16 => wgpu::TextureFormat::Rgba16Float,
            Self::Rg16 => wgpu::TextureFormat::Rg16Float,
            Self::Depth => wgpu::TextureFormat::Depth32Float,
        }
    }
}

bitflags! {
    /// Sampling and lifetime flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u8 {
        /// Sampled with linear filtering.
        const FILTER = 1 << 0;
        /// Allocated with a full mip chain.
        const MIPMAP = 1 << 1;
        /// Short-lived: returned to the transient pool on release.
        const TEMP   = 1 << 2;
    }
}

/// Full description of a 2D render texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TexFormat,
    pub flags: TextureFlags,
    /// Array layers. Only imported textures are layered.
    pub layers: u32,
}

impl TextureDesc {
    #[must_use]
    pub fn new(width: u32, height: u32, format: TexFormat, flags: TextureFlags) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            format,
            flags,
            layers: 1,
        }
    }

    #[must_use]
    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers.max(1);
        self
    }

    /// Number of mip levels the texture is created with.
    #[must_use]
    pub fn mip_level_count(&self) -> u32 {
        if self.flags.contains(TextureFlags::MIPMAP) {
            full_mip_chain(self.width, self.height)
        } else {
            1
        }
    }

    #[inline]
    #[must_use]
    pub fn mip_extent(&self, level: u32) -> (u32, u32) {
        mip_extent(self.width, self.height, level)
    }
}

/// Size of `level`, never smaller than 1×1.
#[inline]
#[must_use]
pub fn mip_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

/// Levels needed to reach 1×1 from `width`×`height`.
#[must_use]
pub fn full_mip_chain(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}
