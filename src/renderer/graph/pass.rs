//! Pass declarations.
//!
//! A [`Pass`] is built once per effect-enablement transition and then drawn
//! every frame. It never stores a texture id or a parameter value: inputs
//! are [`TexRef`] and [`UniformRef`] indirections resolved against the
//! allocator and the [`EffectsState`] at record time.

use bitflags::bitflags;
use glam::Vec4;

use super::commands::UniformValue;
use crate::renderer::backend::ProgramHandle;
use crate::renderer::effects::EffectsState;
use crate::renderer::pipeline::{SampleKind, ShaderInterface, ShaderKey, UniformType};
use crate::renderer::resources::{ExternalBlock, TexSlot};

bitflags! {
    /// Fixed-function state of a pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PassState: u16 {
        const WRITE_COLOR  = 1 << 0;
        const WRITE_DEPTH  = 1 << 1;
        const DEPTH_ALWAYS = 1 << 2;
        /// `dst + src`.
        const ADDITIVE     = 1 << 3;
        /// `dst * src`.
        const MULTIPLY     = 1 << 4;
        /// `src + dst * src.a`, per channel.
        const TRANSMISSION = 1 << 5;
    }
}

/// Texture input of a shading group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexRef {
    /// A fixed slot.
    Slot(TexSlot),
    /// `EffectsState::source_buffer`.
    Source,
    /// `EffectsState::unf_source`.
    UnfSource,
    /// `EffectsState::unf_base`.
    UnfBase,
    /// `EffectsState::depth_src`.
    DepthSource,
    /// `EffectsState::color_src`.
    ColorSource,
}

impl TexRef {
    #[must_use]
    pub fn resolve(self, fx: &EffectsState) -> TexSlot {
        match self {
            Self::Slot(slot) => slot,
            Self::Source => fx.source_buffer,
            Self::UnfSource => fx.unf_source,
            Self::UnfBase => fx.unf_base,
            Self::DepthSource => fx.depth_src,
            Self::ColorSource => fx.color_src,
        }
    }
}

/// Uniform input of a shading group, read from the [`EffectsState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformRef {
    // Motion blur
    MotionBlurSamples,
    CurrInvViewProj,
    PastViewProj,

    // Bloom
    UnfSourceTexelSize,
    BloomSampleScale,
    BloomCurveThreshold,
    BloomIntensity,

    // Depth of field
    DofNearFar,
    DofParams,
    DofLayerSelect,
    DofBokeh,

    // Screen-space reflections
    SsrParameters,
    SsrRayCount,
    SsrMaxRoughness,
    SsrBorderFade,
    SsrFireflyFactor,
    SsrNormalize,
    AoParams0,
    AoParams1,

    // Scene
    PlanarCount,
    ProbeCount,
    LightCount,
    GridCount,
    LodCubeMax,
    LodPlanarMax,
    PrevViewProjection,
    ViewVecs0,
    ViewVecs1,

    // Volumetrics
    VolumeStartEnd,
    VolumeSamplesClamp,

    // Hi-Z
    DepthLayer,
}

impl UniformRef {
    #[must_use]
    pub fn ty(self) -> UniformType {
        match self {
            Self::MotionBlurSamples
            | Self::SsrRayCount
            | Self::SsrNormalize
            | Self::PlanarCount
            | Self::ProbeCount
            | Self::LightCount
            | Self::GridCount
            | Self::DepthLayer => UniformType::Int,
            Self::BloomSampleScale
            | Self::BloomIntensity
            | Self::SsrMaxRoughness
            | Self::SsrBorderFade
            | Self::SsrFireflyFactor
            | Self::LodCubeMax
            | Self::LodPlanarMax => UniformType::Float,
            Self::UnfSourceTexelSize
            | Self::DofNearFar
            | Self::DofLayerSelect
            | Self::VolumeStartEnd => UniformType::Vec2,
            Self::DofParams => UniformType::Vec3,
            Self::BloomCurveThreshold
            | Self::DofBokeh
            | Self::SsrParameters
            | Self::AoParams0
            | Self::AoParams1
            | Self::ViewVecs0
            | Self::ViewVecs1
            | Self::VolumeSamplesClamp => UniformType::Vec4,
            Self::CurrInvViewProj | Self::PastViewProj | Self::PrevViewProjection => {
                UniformType::Mat4
            }
        }
    }

    #[must_use]
    pub fn resolve(self, fx: &EffectsState) -> UniformValue {
        use UniformValue as V;
        match self {
            Self::MotionBlurSamples => V::Int(fx.motion_blur.samples),
            Self::CurrInvViewProj => V::Mat4(fx.motion_blur.current_ndc_to_world),
            Self::PastViewProj => V::Mat4(fx.motion_blur.past_world_to_ndc),

            Self::UnfSourceTexelSize => V::Vec2(fx.unf_source_texel_size),
            Self::BloomSampleScale => V::Float(fx.bloom.sample_scale),
            Self::BloomCurveThreshold => V::Vec4(fx.bloom.curve_threshold),
            Self::BloomIntensity => V::Float(fx.bloom.intensity),

            Self::DofNearFar => V::Vec2(fx.dof.near_far),
            Self::DofParams => V::Vec3(fx.dof.params),
            Self::DofLayerSelect => V::Vec2(fx.dof.layer_select),
            Self::DofBokeh => V::Vec4(fx.dof.bokeh),

            Self::SsrParameters => V::Vec4(fx.ssr.parameters()),
            Self::SsrRayCount => V::Int(fx.ssr.ray_count),
            Self::SsrMaxRoughness => V::Float(fx.ssr.max_roughness),
            Self::SsrBorderFade => V::Float(fx.ssr.border_fade),
            Self::SsrFireflyFactor => V::Float(fx.ssr.firefly_factor),
            Self::SsrNormalize => V::Int(i32::from(fx.ssr.normalize)),
            Self::AoParams0 => V::Vec4(fx.ao.packed()[0]),
            Self::AoParams1 => V::Vec4(fx.ao.packed()[1]),

            Self::PlanarCount => V::Int(fx.scene.planar_count),
            Self::ProbeCount => V::Int(fx.scene.probe_count),
            Self::LightCount => V::Int(fx.scene.light_count),
            Self::GridCount => V::Int(fx.scene.grid_count),
            Self::LodCubeMax => V::Float(fx.scene.lod_cube_max),
            Self::LodPlanarMax => V::Float(fx.scene.lod_planar_max),
            Self::PrevViewProjection => V::Mat4(fx.prev_view_projection),
            Self::ViewVecs0 => V::Vec4(fx.view_vecs[0]),
            Self::ViewVecs1 => V::Vec4(fx.view_vecs[1]),

            Self::VolumeStartEnd => V::Vec2(fx.volumetric.start_end()),
            Self::VolumeSamplesClamp => V::Vec4(fx.volumetric.samples_clamp()),

            Self::DepthLayer => V::Int(fx.depth_src_layer),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureInput {
    pub name: &'static str,
    pub source: TexRef,
    pub kind: SampleKind,
}

impl TextureInput {
    #[inline]
    #[must_use]
    pub const fn color(name: &'static str, source: TexRef) -> Self {
        Self {
            name,
            source,
            kind: SampleKind::Color,
        }
    }

    #[inline]
    #[must_use]
    pub const fn depth(name: &'static str, source: TexRef) -> Self {
        Self {
            name,
            source,
            kind: SampleKind::Depth,
        }
    }
}

/// Geometry a group draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Fullscreen,
    /// One sprite per texel of the slot's texture.
    SpritesPerTexel(TexSlot),
}

/// A program plus the inputs bound to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadingGroup {
    pub key: ShaderKey,
    pub program: ProgramHandle,
    pub textures: Vec<TextureInput>,
    pub uniforms: Vec<(&'static str, UniformRef)>,
    pub blocks: Vec<(&'static str, ExternalBlock)>,
    pub primitive: Primitive,
    pub outputs: u8,
}

#[must_use]
pub fn interface_of(
    textures: &[TextureInput],
    uniforms: &[(&'static str, UniformRef)],
    blocks: &[(&'static str, ExternalBlock)],
) -> ShaderInterface {
    ShaderInterface {
        textures: textures.iter().map(|t| (t.name, t.kind)).collect(),
        uniforms: uniforms.iter().map(|(n, u)| (*n, u.ty())).collect(),
        blocks: blocks.to_vec(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    pub name: &'static str,
    pub state: PassState,
    pub groups: Vec<ShadingGroup>,
}

impl Pass {
    #[must_use]
    pub fn new(name: &'static str, state: PassState) -> Self {
        Self {
            name,
            state,
            groups: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_group(mut self, group: ShadingGroup) -> Self {
        self.groups.push(group);
        self
    }
}

/// Clear value of SSR hit buffers when no history exists: no hit, fully
/// rough.
pub const SSR_SENTINEL_HIT: Vec4 = Vec4::new(0.0, 0.0, -1.0, 0.001);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indirections_follow_the_state() {
        let mut fx = EffectsState::new();
        assert_eq!(TexRef::Source.resolve(&fx), TexSlot::Color);
        fx.source_buffer = TexSlot::ColorPost;
        fx.unf_source = TexSlot::BloomDownsample(2);
        assert_eq!(TexRef::Source.resolve(&fx), TexSlot::ColorPost);
        assert_eq!(TexRef::UnfSource.resolve(&fx), TexSlot::BloomDownsample(2));
        assert_eq!(TexRef::Slot(TexSlot::MaxZ).resolve(&fx), TexSlot::MaxZ);
    }

    #[test]
    fn resolved_values_match_declared_types() {
        let fx = EffectsState::new();
        for u in [
            UniformRef::MotionBlurSamples,
            UniformRef::PastViewProj,
            UniformRef::DofParams,
            UniformRef::SsrParameters,
            UniformRef::SsrNormalize,
            UniformRef::VolumeStartEnd,
            UniformRef::LodCubeMax,
            UniformRef::DepthLayer,
        ] {
            assert_eq!(u.resolve(&fx).ty(), u.ty(), "{u:?}");
        }
    }
}
