//! Semantic resource slots.
//!
//! Passes never hold physical texture ids. They name a slot, and the
//! allocator resolves the slot to whatever texture currently backs it when
//! a command is recorded. Re-creating a texture, or exchanging the main and
//! history color buffers, therefore never requires a pass rebuild.

use std::fmt;

use crate::renderer::pipeline::SampleKind;

/// Host-owned textures imported into a viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalTexture {
    /// Reflection cubemap pool.
    ProbeCubes,
    /// Planar reflection color pool.
    ProbePlanars,
    /// Planar reflection depth.
    PlanarDepth,
    /// Utility lookup tables (BRDF LUT, blue noise).
    UtilTex,
    /// Point light shadow cube pool.
    ShadowCubePool,
    /// Sun cascade shadow pool.
    ShadowCascadePool,
    /// Irradiance grid pool.
    IrradianceGrid,
}

impl ExternalTexture {
    pub const ALL: [Self; 7] = [
        Self::ProbeCubes,
        Self::ProbePlanars,
        Self::PlanarDepth,
        Self::UtilTex,
        Self::ShadowCubePool,
        Self::ShadowCascadePool,
        Self::IrradianceGrid,
    ];

    /// How passes sample the texture.
    #[must_use]
    pub fn sample_kind(self) -> SampleKind {
        match self {
            Self::ProbeCubes | Self::ProbePlanars | Self::UtilTex => SampleKind::ColorArray,
            Self::IrradianceGrid => SampleKind::Color,
            Self::PlanarDepth | Self::ShadowCubePool | Self::ShadowCascadePool => {
                SampleKind::DepthArray
            }
        }
    }
}

/// Opaque uniform blocks supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalBlock {
    Probes,
    Planars,
    Lights,
    Shadows,
    Grids,
}

/// Texture slots a viewport may own or import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexSlot {
    /// Scene color. Exchanged with [`TexSlot::ColorDoubleBuffer`] once per frame.
    Color,
    /// Ping-pong target for post effects.
    ColorPost,
    /// Previous frame color (history).
    ColorDoubleBuffer,
    /// Scene depth.
    SceneDepth,

    BloomBlit,
    BloomDownsample(u8),
    BloomUpsample(u8),

    DofDownNear,
    DofDownFar,
    DofCoc,
    DofFarBlur,
    DofNearBlur,

    MinZ,
    MaxZ,

    Volumetric,
    VolumetricTransmit,

    SsrNormalInput,
    SsrSpecRoughInput,
    SsrHit(u8),

    External(ExternalTexture),
}

impl fmt::Display for TexSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Framebuffer slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FbSlot {
    /// Scene color + depth + SSR inputs.
    Main,
    /// Ping-pong target wrapping [`TexSlot::ColorPost`].
    Effect,
    /// Wraps the color history.
    DoubleBuffer,
    /// Display output. Depth is re-attached here at the end of the frame.
    Default,

    BloomBlit,
    BloomDown(u8),
    BloomAccum(u8),

    DofDown,
    DofScatterFar,
    DofScatterNear,

    /// Shared target of the Hi-Z and history downsample chains.
    Downsample,
    Volumetric,
    ScreenTracing,
}

impl fmt::Display for FbSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Attachment point within a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachPoint {
    Color(u8),
    Depth,
}
