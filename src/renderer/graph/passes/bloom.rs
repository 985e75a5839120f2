//! Bloom
//!
//! Dual-filter bloom. The blit runs at full resolution and each downsample
//! halves it.
//!
//! ```text
//!   source ─blit─► BloomBlit ─down─► Down0 ─down─► Down1 ... Down(n-1)
//!                                      │             │          │
//!                  Up0 ◄──────up────── Up1 ◄── ... ◄─┘◄─────────┘
//!                   │         (Up(i) = filtered Down(i) + the coarser level)
//!                   └──resolve──► target = source + Up0 * intensity
//! ```
//!
//! The blit applies the soft-knee threshold. With `high_quality` the blit
//! and first downsample use the anti-flicker 13-tap variant, and the
//! upsample uses a 9-tap tent.

use crate::errors::Result;
use crate::renderer::effects::EffectsState;
use crate::renderer::graph::builder::{GroupDesc, ProgramSource};
use crate::renderer::graph::pass::{Pass, PassState, TexRef, UniformRef};
use crate::renderer::graph::recorder::Recorder;
use crate::renderer::pipeline::{ShaderKey, ShaderVariant};
use crate::renderer::resources::{AttachPoint, FbSlot, TexSlot};

pub struct BloomPasses {
    pub blit: Pass,
    pub downsample_first: Pass,
    pub downsample: Pass,
    pub upsample: Pass,
    pub resolve: Pass,
}

impl BloomPasses {
    pub(crate) fn build(src: &mut ProgramSource<'_>, fx: &EffectsState) -> Option<Self> {
        let hq = fx.bloom.high_quality;
        let step = |step: ShaderVariant, hq: bool| {
            GroupDesc::new(ShaderKey::bloom(step, hq))
                .color("source_buffer", TexRef::UnfSource)
                .uniform("source_buffer_texel_size", UniformRef::UnfSourceTexelSize)
        };

        let blit = src.group(
            step(ShaderVariant::STEP_BLIT, hq)
                .uniform("curve_threshold", UniformRef::BloomCurveThreshold),
        )?;
        let downsample_first = src.group(step(ShaderVariant::STEP_DOWNSAMPLE, hq))?;
        let downsample = src.group(step(ShaderVariant::STEP_DOWNSAMPLE, false))?;
        let upsample = src.group(
            step(ShaderVariant::STEP_UPSAMPLE, hq)
                .color("base_buffer", TexRef::UnfBase)
                .uniform("sample_scale", UniformRef::BloomSampleScale),
        )?;
        let resolve = src.group(
            step(ShaderVariant::STEP_RESOLVE, hq)
                .color("base_buffer", TexRef::UnfBase)
                .uniform("sample_scale", UniformRef::BloomSampleScale)
                .uniform("bloom_intensity", UniformRef::BloomIntensity),
        )?;

        Some(Self {
            blit: Pass::new("Bloom Blit", PassState::WRITE_COLOR).with_group(blit),
            downsample_first: Pass::new("Bloom Downsample First", PassState::WRITE_COLOR)
                .with_group(downsample_first),
            downsample: Pass::new("Bloom Downsample", PassState::WRITE_COLOR)
                .with_group(downsample),
            upsample: Pass::new("Bloom Upsample", PassState::WRITE_COLOR).with_group(upsample),
            resolve: Pass::new("Bloom Resolve", PassState::WRITE_COLOR).with_group(resolve),
        })
    }

    pub fn record(&self, rec: &mut Recorder<'_>, fx: &mut EffectsState) -> Result<()> {
        let count = fx.bloom.iteration_count as usize;
        rec.push_group("Bloom");

        // Depth of field may have borrowed the first downsample level this frame.
        rec.attach(FbSlot::BloomDown(0), AttachPoint::Color(0), TexSlot::BloomDownsample(0), 0);

        fx.unf_source = fx.source_buffer;
        fx.unf_source_texel_size = fx.bloom.source_texel_size;
        rec.bind(FbSlot::BloomBlit)?;
        rec.draw(fx, &self.blit)?;

        fx.unf_source = TexSlot::BloomBlit;
        fx.unf_source_texel_size = fx.bloom.blit_texel_size;
        rec.bind(FbSlot::BloomDown(0))?;
        rec.draw(fx, &self.downsample_first)?;

        let mut last = TexSlot::BloomDownsample(0);
        for i in 1..count {
            fx.unf_source = last;
            fx.unf_source_texel_size = fx.bloom.down_texel_sizes[i - 1];
            rec.bind(FbSlot::BloomDown(i as u8))?;
            rec.draw(fx, &self.downsample)?;
            last = TexSlot::BloomDownsample(i as u8);
        }

        for i in (0..count.saturating_sub(1)).rev() {
            fx.unf_source = TexSlot::BloomDownsample(i as u8);
            fx.unf_source_texel_size = fx.bloom.down_texel_sizes[i];
            fx.unf_base = last;
            rec.bind(FbSlot::BloomAccum(i as u8))?;
            rec.draw(fx, &self.upsample)?;
            last = TexSlot::BloomUpsample(i as u8);
        }

        fx.unf_source = last;
        fx.unf_source_texel_size = fx.bloom.down_texel_sizes[0];
        fx.unf_base = fx.source_buffer;
        rec.bind(fx.target_buffer)?;
        rec.draw(fx, &self.resolve)?;

        rec.pop_group();
        Ok(())
    }
}
