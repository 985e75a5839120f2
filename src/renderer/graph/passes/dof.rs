//! Depth of Field
//!
//! Scatter-based bokeh at half resolution.
//!
//! ```text
//!   source + depth ─down─► near color, far color, CoC     (3 targets)
//!   far color  ─scatter (one sprite per texel)─► FarBlur   (additive)
//!   near color ─scatter──────────────────────► NearBlur  (additive)
//!   source + NearBlur + FarBlur + depth ─resolve─► target
//! ```
//!
//! The near color target is either owned by this effect or bloom's first
//! downsample level, see [`DofNearSource`](crate::renderer::effects::DofNearSource).

use glam::Vec2;

use crate::errors::Result;
use crate::renderer::effects::EffectsState;
use crate::renderer::graph::builder::{GroupDesc, ProgramSource};
use crate::renderer::graph::pass::{Pass, PassState, TexRef, UniformRef};
use crate::renderer::graph::recorder::Recorder;
use crate::renderer::pipeline::{Program, ShaderKey, ShaderVariant};
use crate::renderer::resources::{FbSlot, TexSlot};

pub struct DofPasses {
    pub downsample: Pass,
    pub scatter: Pass,
    pub resolve: Pass,
}

const FAR_LAYER: Vec2 = Vec2::new(0.0, 1.0);
const NEAR_LAYER: Vec2 = Vec2::new(1.0, 0.0);

impl DofPasses {
    pub(crate) fn build(src: &mut ProgramSource<'_>) -> Option<Self> {
        let key = |step| ShaderKey::new(Program::DepthOfField, step);

        let downsample = src.group(
            GroupDesc::new(key(ShaderVariant::STEP_DOWNSAMPLE))
                .color("color_buffer", TexRef::Source)
                .depth("depth_buffer", TexRef::Slot(TexSlot::SceneDepth))
                .uniform("near_far", UniformRef::DofNearFar)
                .uniform("dof_params", UniformRef::DofParams)
                .outputs(3),
        )?;
        let scatter = src.group(
            GroupDesc::new(key(ShaderVariant::STEP_SCATTER))
                .color("color_buffer", TexRef::UnfSource)
                .color("coc_buffer", TexRef::Slot(TexSlot::DofCoc))
                .uniform("layer_selection", UniformRef::DofLayerSelect)
                .uniform("bokeh_params", UniformRef::DofBokeh)
                .sprites(TexSlot::DofCoc),
        )?;
        let resolve = src.group(
            GroupDesc::new(key(ShaderVariant::STEP_RESOLVE))
                .color("color_buffer", TexRef::Source)
                .color("near_buffer", TexRef::Slot(TexSlot::DofNearBlur))
                .color("far_buffer", TexRef::Slot(TexSlot::DofFarBlur))
                .depth("depth_buffer", TexRef::Slot(TexSlot::SceneDepth))
                .uniform("near_far", UniformRef::DofNearFar)
                .uniform("dof_params", UniformRef::DofParams),
        )?;

        Some(Self {
            downsample: Pass::new("DoF Downsample", PassState::WRITE_COLOR).with_group(downsample),
            scatter: Pass::new("DoF Scatter", PassState::WRITE_COLOR | PassState::ADDITIVE)
                .with_group(scatter),
            resolve: Pass::new("DoF Resolve", PassState::WRITE_COLOR).with_group(resolve),
        })
    }

    pub fn record(&self, rec: &mut Recorder<'_>, fx: &mut EffectsState) -> Result<()> {
        rec.push_group("Depth Of Field");

        rec.bind(FbSlot::DofDown)?;
        rec.draw(fx, &self.downsample)?;

        fx.unf_source = TexSlot::DofDownFar;
        fx.dof.layer_select = FAR_LAYER;
        rec.bind(FbSlot::DofScatterFar)?;
        rec.clear(Some([0.0; 4]), None)?;
        rec.draw(fx, &self.scatter)?;

        fx.unf_source = fx.dof.near_source.slot();
        fx.dof.layer_select = NEAR_LAYER;
        rec.bind(FbSlot::DofScatterNear)?;
        rec.clear(Some([0.0; 4]), None)?;
        rec.draw(fx, &self.scatter)?;

        rec.bind(fx.target_buffer)?;
        rec.draw(fx, &self.resolve)?;

        rec.pop_group();
        Ok(())
    }
}
