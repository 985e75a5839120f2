//! Camera motion blur.
//!
//! Reprojects each pixel with the current inverse and the past
//! view-projection, then averages `samples` taps along the screen-space
//! motion vector.

use crate::errors::Result;
use crate::renderer::effects::EffectsState;
use crate::renderer::graph::builder::{GroupDesc, ProgramSource};
use crate::renderer::graph::pass::{Pass, PassState, TexRef, UniformRef};
use crate::renderer::graph::recorder::Recorder;
use crate::renderer::pipeline::{Program, ShaderKey};
use crate::renderer::resources::TexSlot;

pub struct MotionBlurPasses {
    pub blur: Pass,
}

impl MotionBlurPasses {
    pub(crate) fn build(src: &mut ProgramSource<'_>) -> Option<Self> {
        let group = src.group(
            GroupDesc::new(ShaderKey::plain(Program::MotionBlur))
                .color("color_buffer", TexRef::Source)
                .depth("depth_buffer", TexRef::Slot(TexSlot::SceneDepth))
                .uniform("samples", UniformRef::MotionBlurSamples)
                .uniform("curr_inv_view_proj", UniformRef::CurrInvViewProj)
                .uniform("past_view_proj", UniformRef::PastViewProj),
        )?;
        Some(Self {
            blur: Pass::new("Motion Blur", PassState::WRITE_COLOR).with_group(group),
        })
    }

    pub fn record(&self, rec: &mut Recorder<'_>, fx: &EffectsState) -> Result<()> {
        rec.push_group("Motion Blur");
        rec.bind(fx.target_buffer)?;
        rec.draw(fx, &self.blur)?;
        rec.pop_group();
        Ok(())
    }
}
