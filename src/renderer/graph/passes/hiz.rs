//! Hierarchical Z
//!
//! Min and max depth pyramids at half resolution, used by screen-space
//! tracing to skip empty space.
//!
//! ```text
//!   depth (full res, optional layer) ──copy──► MinZ mip 0 ──reduce──► mip 1..n
//!                                    ──copy──► MaxZ mip 0 ──reduce──► mip 1..n
//! ```
//!
//! Every pass writes depth only, with the depth test forced to pass.

use crate::errors::Result;
use crate::renderer::effects::EffectsState;
use crate::renderer::graph::builder::{GroupDesc, ProgramSource};
use crate::renderer::graph::downsample::recursive_downsample;
use crate::renderer::graph::pass::{Pass, PassState, TexRef, UniformRef};
use crate::renderer::graph::recorder::Recorder;
use crate::renderer::pipeline::{SampleKind, ShaderKey};
use crate::renderer::resources::{AttachPoint, FbSlot, TexSlot};

/// One pyramid's passes.
pub struct Pyramid {
    slot: TexSlot,
    copy: Pass,
    copy_layered: Pass,
    reduce: Pass,
}

pub struct HizPasses {
    pub min: Pyramid,
    pub max: Pyramid,
}

const DEPTH_ONLY: PassState = PassState::WRITE_DEPTH.union(PassState::DEPTH_ALWAYS);

impl Pyramid {
    fn build(src: &mut ProgramSource<'_>, min: bool) -> Option<Self> {
        let (slot, copy_name, reduce_name) = if min {
            (TexSlot::MinZ, "Min Z Copy", "Min Z Downsample")
        } else {
            (TexSlot::MaxZ, "Max Z Copy", "Max Z Downsample")
        };

        let copy = src.group(
            GroupDesc::new(ShaderKey::minmaxz(min, true, false))
                .depth("depth_buffer", TexRef::DepthSource)
                .outputs(0),
        )?;
        let copy_layered = src.group(
            GroupDesc::new(ShaderKey::minmaxz(min, true, true))
                .sampled("depth_buffer", TexRef::DepthSource, SampleKind::DepthArray)
                .uniform("depth_layer", UniformRef::DepthLayer)
                .outputs(0),
        )?;
        let reduce = src.group(
            GroupDesc::new(ShaderKey::minmaxz(min, false, false))
                .depth("depth_buffer", TexRef::Slot(slot))
                .outputs(0),
        )?;

        Some(Self {
            slot,
            copy: Pass::new(copy_name, DEPTH_ONLY).with_group(copy),
            copy_layered: Pass::new(copy_name, DEPTH_ONLY).with_group(copy_layered),
            reduce: Pass::new(reduce_name, DEPTH_ONLY).with_group(reduce),
        })
    }

    fn record(
        &self,
        rec: &mut Recorder<'_>,
        fx: &EffectsState,
        layered: bool,
        max_levels: u32,
    ) -> Result<u32> {
        rec.detach_all(FbSlot::Downsample);
        rec.attach(FbSlot::Downsample, AttachPoint::Depth, self.slot, 0);
        rec.bind(FbSlot::Downsample)?;
        rec.draw(fx, if layered { &self.copy_layered } else { &self.copy })?;
        rec.detach(self.slot);

        recursive_downsample(rec, FbSlot::Downsample, self.slot, max_levels, |rec, _| {
            rec.draw(fx, &self.reduce)
        })
    }
}

impl HizPasses {
    pub(crate) fn build(src: &mut ProgramSource<'_>) -> Option<Self> {
        Some(Self {
            min: Pyramid::build(src, true)?,
            max: Pyramid::build(src, false)?,
        })
    }

    /// Builds both pyramids from `depth`, or from one slice of it.
    ///
    /// Returns the level count of the min pyramid (both pyramids share
    /// their descriptor shape).
    pub fn create_minmax_buffer(
        &self,
        rec: &mut Recorder<'_>,
        fx: &mut EffectsState,
        depth: TexSlot,
        layer: Option<u32>,
        max_levels: u32,
    ) -> Result<u32> {
        fx.depth_src = depth;
        fx.depth_src_layer = layer.map_or(0, |l| l as i32);
        let fx = &*fx;
        let layered = layer.is_some();

        rec.push_group("Min buffer");
        let levels = self.min.record(rec, fx, layered, max_levels)?;
        rec.pop_group();

        rec.push_group("Max buffer");
        self.max.record(rec, fx, layered, max_levels)?;
        rec.pop_group();

        Ok(levels)
    }
}
