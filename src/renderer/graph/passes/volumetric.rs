//! Volumetrics
//!
//! Integrates the world volume material at half resolution, then composites
//! it over the main color buffer.
//!
//! ```text
//!   Volumetric fb ◄─integrate── depth, shadows, irradiance, lights
//!     scattering (+ colored transmittance)
//!
//!   Main ◄─resolve── mono:    color * T + S        (one pass)
//!                    colored: color * T, then + S  (two passes)
//! ```
//!
//! The integrate program embeds the host material code, so it is compiled
//! per material.

use crate::errors::Result;
use crate::renderer::context::WorldVolume;
use crate::renderer::effects::EffectsState;
use crate::renderer::graph::builder::{GroupDesc, ProgramSource};
use crate::renderer::graph::pass::{Pass, PassState, TexRef, UniformRef};
use crate::renderer::graph::recorder::Recorder;
use crate::renderer::pipeline::{Program, ShaderKey, ShaderVariant};
use crate::renderer::resources::{AttachPoint, ExternalBlock, ExternalTexture, FbSlot, TexSlot};

pub struct VolumetricPasses {
    pub integrate: Pass,
    /// Multiplies the colored transmittance in. Colored mode only.
    pub transmit: Option<Pass>,
    pub resolve: Pass,
}

impl VolumetricPasses {
    pub(crate) fn build(
        src: &mut ProgramSource<'_>,
        fx: &EffectsState,
        volume: &dyn WorldVolume,
    ) -> Option<Self> {
        let params = &fx.volumetric;
        let colored = params.colored_transmittance;

        let mut variant = ShaderVariant::STEP_INTEGRATE;
        variant.set(ShaderVariant::VOLUME_LIGHTS, params.use_lights);
        variant.set(ShaderVariant::VOLUME_SHADOWS, params.use_shadows);
        variant.set(ShaderVariant::COLORED_TRANSMITTANCE, colored);

        let integrate = src.material_group(
            GroupDesc::new(ShaderKey::new(Program::Volumetric, variant))
                .depth("depth_full", TexRef::DepthSource)
                .external("shadow_cubes", ExternalTexture::ShadowCubePool)
                .external("shadow_cascades", ExternalTexture::ShadowCascadePool)
                .external("irradiance_grid", ExternalTexture::IrradianceGrid)
                .external("util_tex", ExternalTexture::UtilTex)
                .uniform("light_count", UniformRef::LightCount)
                .uniform("grid_count", UniformRef::GridCount)
                .uniform("viewvecs0", UniformRef::ViewVecs0)
                .uniform("viewvecs1", UniformRef::ViewVecs1)
                .uniform("volume_start_end", UniformRef::VolumeStartEnd)
                .uniform("volume_samples_clamp", UniformRef::VolumeSamplesClamp)
                .block("light_block", ExternalBlock::Lights)
                .block("grid_block", ExternalBlock::Grids)
                .block("shadow_block", ExternalBlock::Shadows)
                .outputs(if colored { 2 } else { 1 }),
            volume,
        )?;

        let mut upsample = ShaderVariant::STEP_UPSAMPLE;
        upsample.set(ShaderVariant::COLORED_TRANSMITTANCE, colored);
        let resolve_group = |src: &mut ProgramSource<'_>, slot| {
            src.group(
                GroupDesc::new(ShaderKey::new(Program::Volumetric, upsample))
                    .depth("depth_full", TexRef::DepthSource)
                    .color("volumetric_buffer", TexRef::Slot(slot))
                    .uniform("viewvecs0", UniformRef::ViewVecs0)
                    .uniform("viewvecs1", UniformRef::ViewVecs1),
            )
        };

        let resolve = resolve_group(src, TexSlot::Volumetric)?;
        let (transmit, resolve_state) = if colored {
            let group = resolve_group(src, TexSlot::VolumetricTransmit)?;
            let pass = Pass::new(
                "Volumetric Transmittance",
                PassState::WRITE_COLOR | PassState::MULTIPLY,
            )
            .with_group(group);
            (Some(pass), PassState::WRITE_COLOR | PassState::ADDITIVE)
        } else {
            (None, PassState::WRITE_COLOR | PassState::TRANSMISSION)
        };

        Some(Self {
            integrate: Pass::new("Volumetric Integration", PassState::WRITE_COLOR)
                .with_group(integrate),
            transmit,
            resolve: Pass::new("Volumetric Resolve", resolve_state).with_group(resolve),
        })
    }

    pub fn record(&self, rec: &mut Recorder<'_>, fx: &mut EffectsState) -> Result<()> {
        fx.depth_src = TexSlot::SceneDepth;
        let fx = &*fx;
        let colored = self.transmit.is_some();
        rec.push_group("Volumetrics");

        rec.attach(FbSlot::Volumetric, AttachPoint::Color(0), TexSlot::Volumetric, 0);
        if colored {
            rec.attach(
                FbSlot::Volumetric,
                AttachPoint::Color(1),
                TexSlot::VolumetricTransmit,
                0,
            );
        }
        rec.bind(FbSlot::Volumetric)?;
        rec.draw(fx, &self.integrate)?;

        rec.detach(TexSlot::SceneDepth);
        rec.bind(FbSlot::Main)?;
        if let Some(transmit) = &self.transmit {
            rec.draw(fx, transmit)?;
        }
        rec.draw(fx, &self.resolve)?;

        rec.attach(FbSlot::Main, AttachPoint::Depth, TexSlot::SceneDepth, 0);
        rec.detach(TexSlot::Volumetric);
        if colored {
            rec.detach(TexSlot::VolumetricTransmit);
        }

        rec.pop_group();
        Ok(())
    }
}
