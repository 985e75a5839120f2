//! Per-viewport effect state.

use glam::{Mat4, Vec2, Vec4};
use smallvec::SmallVec;

use super::EffectFlags;
use super::sharing::DofNearSource;
use crate::renderer::resources::{FbSlot, TexSlot};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionBlurParams {
    pub samples: i32,
    pub current_ndc_to_world: Mat4,
    pub past_world_to_ndc: Mat4,
}

impl Default for MotionBlurParams {
    fn default() -> Self {
        Self {
            samples: 0,
            current_ndc_to_world: Mat4::IDENTITY,
            past_world_to_ndc: Mat4::IDENTITY,
        }
    }
}

/// Resolved bloom chain.
///
/// `down_sizes[i]` is the size of downsample level `i`; the upsample chain
/// reuses the first `iteration_count - 1` of them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BloomParams {
    pub iteration_count: u32,
    pub sample_scale: f32,
    pub curve_threshold: Vec4,
    pub intensity: f32,
    pub high_quality: bool,
    pub source_texel_size: Vec2,
    pub blit_size: (u32, u32),
    pub blit_texel_size: Vec2,
    pub down_sizes: SmallVec<[(u32, u32); 16]>,
    pub down_texel_sizes: SmallVec<[Vec2; 16]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DofParams {
    /// Negated camera clip start and end.
    pub near_far: Vec2,
    /// `[coc scale, -focus distance, viewport / sensor]`.
    pub params: glam::Vec3,
    /// `[blades, rotation, ratio, max bokeh size]`.
    pub bokeh: Vec4,
    /// Near/far weighting of the current scatter pass.
    pub layer_select: Vec2,
    pub size: (u32, u32),
    pub near_source: DofNearSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SsrParams {
    /// `1 - quality`.
    pub quality: f32,
    pub thickness: f32,
    pub pixel_size: Vec2,
    pub ray_count: i32,
    pub full_res: bool,
    pub tracing_size: (u32, u32),
    pub normalize: bool,
    pub max_roughness: f32,
    pub border_fade: f32,
    pub firefly_factor: f32,
}

impl SsrParams {
    /// `[quality, thickness, pixel_size.x, pixel_size.y]`.
    #[inline]
    #[must_use]
    pub fn parameters(&self) -> Vec4 {
        Vec4::new(
            self.quality,
            self.thickness,
            self.pixel_size.x,
            self.pixel_size.y,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VolumetricParams {
    /// Integration bounds in view-space depth.
    pub start: f32,
    pub end: f32,
    pub integration_steps: f32,
    pub shadow_steps: f32,
    pub sample_distribution: f32,
    pub light_clamp: f32,
    pub use_lights: bool,
    pub use_shadows: bool,
    pub colored_transmittance: bool,
    pub size: (u32, u32),
}

impl VolumetricParams {
    #[inline]
    #[must_use]
    pub fn start_end(&self) -> Vec2 {
        Vec2::new(self.start, self.end)
    }

    /// `[steps, shadow steps, sample distribution, light clamp]`.
    #[inline]
    #[must_use]
    pub fn samples_clamp(&self) -> Vec4 {
        Vec4::new(
            self.integration_steps,
            self.shadow_steps,
            self.sample_distribution,
            self.light_clamp,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AoParams {
    pub distance: f32,
    pub factor: f32,
    pub samples: f32,
}

impl AoParams {
    /// The two `aoParameters` vectors bound by the raytrace pass.
    #[must_use]
    pub fn packed(&self) -> [Vec4; 2] {
        [
            Vec4::new(self.distance, self.factor, 0.0, 0.0),
            Vec4::new(self.samples, 0.0, 0.0, 0.0),
        ]
    }
}

/// Scene data copied from the host each frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SceneCounters {
    pub light_count: i32,
    pub probe_count: i32,
    pub planar_count: i32,
    pub grid_count: i32,
    pub lod_cube_max: f32,
    pub lod_planar_max: f32,
}

/// Everything a frame's passes read.
///
/// Passes hold [`TexRef`](crate::renderer::graph::TexRef) and
/// [`UniformRef`](crate::renderer::graph::UniformRef) indirections into this
/// record, so the scheduler can retarget them between draws without
/// rebuilding anything.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectsState {
    pub enabled: EffectFlags,
    pub viewport: (u32, u32),

    pub view_projection: Mat4,
    pub inv_view_projection: Mat4,
    /// View-projection of the previous frame.
    pub prev_view_projection: Mat4,
    pub view_vecs: [Vec4; 2],

    /// Color history holds a complete previous frame.
    pub valid_double_buffer: bool,
    pub image_render: bool,

    pub motion_blur: MotionBlurParams,
    pub bloom: BloomParams,
    pub dof: DofParams,
    pub ssr: SsrParams,
    pub volumetric: VolumetricParams,
    pub ao: AoParams,
    pub scene: SceneCounters,

    // === Indirection targets (retargeted while recording) ===
    /// Latest rendered color.
    pub source_buffer: TexSlot,
    /// Next ping-pong target.
    pub target_buffer: FbSlot,
    pub unf_source: TexSlot,
    pub unf_base: TexSlot,
    pub unf_source_texel_size: Vec2,
    pub depth_src: TexSlot,
    pub depth_src_layer: i32,
    pub color_src: TexSlot,
}

impl Default for EffectsState {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectsState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: EffectFlags::empty(),
            viewport: (0, 0),
            view_projection: Mat4::IDENTITY,
            inv_view_projection: Mat4::IDENTITY,
            prev_view_projection: Mat4::IDENTITY,
            view_vecs: [Vec4::ZERO; 2],
            valid_double_buffer: false,
            image_render: false,
            motion_blur: MotionBlurParams::default(),
            bloom: BloomParams::default(),
            dof: DofParams::default(),
            ssr: SsrParams::default(),
            volumetric: VolumetricParams::default(),
            ao: AoParams::default(),
            scene: SceneCounters::default(),
            source_buffer: TexSlot::Color,
            target_buffer: FbSlot::Effect,
            unf_source: TexSlot::Color,
            unf_base: TexSlot::Color,
            unf_source_texel_size: Vec2::ZERO,
            depth_src: TexSlot::SceneDepth,
            depth_src_layer: 0,
            color_src: TexSlot::Color,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self, flags: EffectFlags) -> bool {
        self.enabled.contains(flags)
    }

    /// Source and target roles at the start of the post chain.
    pub fn reset_ping_pong(&mut self) {
        self.source_buffer = TexSlot::Color;
        self.target_buffer = FbSlot::Effect;
    }
}
