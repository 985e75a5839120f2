//! Screen-Space Reflections
//!
//! ```text
//!   ScreenTracing ◄─raytrace── depth, normal, spec/rough, Hi-Z, planar depth
//!   (SsrHit 0..rays)            or sentinel clear when history is invalid
//!
//!   history ─downsample─► pre-filtered mips
//!
//!   Main ◄─resolve (additive)── hits + history + probes
//! ```
//!
//! The resolve reads the previous frame's color, so tracing only runs once a
//! valid history exists. Until then the hit buffers are cleared to
//! [`SSR_SENTINEL_HIT`] and the resolve falls back to probes.

use crate::errors::Result;
use crate::renderer::effects::EffectsState;
use crate::renderer::graph::builder::{GroupDesc, ProgramSource};
use crate::renderer::graph::pass::{Pass, PassState, SSR_SENTINEL_HIT, TexRef, UniformRef};
use crate::renderer::graph::passes::CommonPasses;
use crate::renderer::graph::recorder::Recorder;
use crate::renderer::pipeline::ShaderKey;
use crate::renderer::resources::{
    AttachPoint, ExternalBlock, ExternalTexture, FbSlot, TexSlot,
};
use crate::settings::MAX_SSR_RAYS;

const HIT_NAMES: [&str; MAX_SSR_RAYS as usize] =
    ["hit_buffer0", "hit_buffer1", "hit_buffer2", "hit_buffer3"];

pub struct SsrPasses {
    pub raytrace: Pass,
    pub resolve: Pass,
    ray_count: u8,
}

impl SsrPasses {
    pub(crate) fn build(src: &mut ProgramSource<'_>, fx: &EffectsState) -> Option<Self> {
        let ssr = &fx.ssr;
        let ray_count = ssr.ray_count.clamp(1, MAX_SSR_RAYS) as u8;
        let inputs = |key| {
            GroupDesc::new(key)
                .depth("depth_buffer", TexRef::DepthSource)
                .color("normal_buffer", TexRef::Slot(TexSlot::SsrNormalInput))
                .color("specrough_buffer", TexRef::Slot(TexSlot::SsrSpecRoughInput))
                .external("util_tex", ExternalTexture::UtilTex)
        };

        let raytrace = src.group(
            inputs(ShaderKey::ssr(false, ssr.full_res))
                .depth("maxz_buffer", TexRef::Slot(TexSlot::MaxZ))
                .depth("minz_buffer", TexRef::Slot(TexSlot::MinZ))
                .external("planar_depth", ExternalTexture::PlanarDepth)
                .uniform("viewvecs0", UniformRef::ViewVecs0)
                .uniform("viewvecs1", UniformRef::ViewVecs1)
                .uniform("ssr_parameters", UniformRef::SsrParameters)
                .uniform("ray_count", UniformRef::SsrRayCount)
                .uniform("planar_count", UniformRef::PlanarCount)
                .uniform("max_roughness", UniformRef::SsrMaxRoughness)
                .uniform("ao_parameters0", UniformRef::AoParams0)
                .uniform("ao_parameters1", UniformRef::AoParams1)
                .block("planar_block", ExternalBlock::Planars)
                .outputs(MAX_SSR_RAYS as u8),
        )?;

        let mut resolve = inputs(ShaderKey::ssr(true, ssr.full_res))
            .color("color_buffer", TexRef::Slot(TexSlot::ColorDoubleBuffer))
            .external("probe_cubes", ExternalTexture::ProbeCubes)
            .external("probe_planars", ExternalTexture::ProbePlanars);
        for (i, name) in HIT_NAMES.into_iter().enumerate() {
            // Unused hit inputs alias the first buffer.
            let hit = if i < usize::from(ray_count) { i as u8 } else { 0 };
            resolve = resolve.color(name, TexRef::Slot(TexSlot::SsrHit(hit)));
        }
        let resolve = src.group(
            resolve
                .uniform("past_view_projection", UniformRef::PrevViewProjection)
                .uniform("viewvecs0", UniformRef::ViewVecs0)
                .uniform("viewvecs1", UniformRef::ViewVecs1)
                .uniform("planar_count", UniformRef::PlanarCount)
                .uniform("probe_count", UniformRef::ProbeCount)
                .uniform("border_fade", UniformRef::SsrBorderFade)
                .uniform("max_roughness", UniformRef::SsrMaxRoughness)
                .uniform("lod_cube_max", UniformRef::LodCubeMax)
                .uniform("lod_planar_max", UniformRef::LodPlanarMax)
                .uniform("firefly_factor", UniformRef::SsrFireflyFactor)
                .uniform("ray_count", UniformRef::SsrRayCount)
                .uniform("ssr_normalize", UniformRef::SsrNormalize)
                .block("probe_block", ExternalBlock::Probes)
                .block("planar_block", ExternalBlock::Planars),
        )?;

        Some(Self {
            raytrace: Pass::new("SSR Raytrace", PassState::WRITE_COLOR).with_group(raytrace),
            resolve: Pass::new("SSR Resolve", PassState::WRITE_COLOR | PassState::ADDITIVE)
                .with_group(resolve),
            ray_count,
        })
    }

    /// Traces, pre-filters the history and composites reflections into
    /// the main color buffer.
    pub fn record(
        &self,
        rec: &mut Recorder<'_>,
        fx: &mut EffectsState,
        common: &CommonPasses,
        history_max_levels: u32,
    ) -> Result<()> {
        fx.depth_src = TexSlot::SceneDepth;
        rec.push_group("SSR");

        for i in 0..self.ray_count {
            rec.attach(FbSlot::ScreenTracing, AttachPoint::Color(i), TexSlot::SsrHit(i), 0);
        }
        rec.bind(FbSlot::ScreenTracing)?;
        if fx.valid_double_buffer {
            rec.draw(fx, &self.raytrace)?;
        } else {
            rec.clear(Some(SSR_SENTINEL_HIT.to_array()), None)?;
        }
        for i in 0..self.ray_count {
            rec.detach(TexSlot::SsrHit(i));
        }

        common.downsample_buffer(
            rec,
            fx,
            FbSlot::Downsample,
            TexSlot::ColorDoubleBuffer,
            history_max_levels,
        )?;

        rec.detach(TexSlot::SceneDepth);
        rec.detach(TexSlot::SsrNormalInput);
        rec.detach(TexSlot::SsrSpecRoughInput);
        rec.bind(FbSlot::Main)?;
        rec.draw(fx, &self.resolve)?;

        rec.attach(FbSlot::Main, AttachPoint::Depth, TexSlot::SceneDepth, 0);
        rec.attach(FbSlot::Main, AttachPoint::Color(1), TexSlot::SsrNormalInput, 0);
        rec.attach(FbSlot::Main, AttachPoint::Color(2), TexSlot::SsrSpecRoughInput, 0);

        rec.pop_group();
        Ok(())
    }
}
