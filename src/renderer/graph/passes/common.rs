//! Passes shared by every frame: color downsampling and display.

use crate::errors::Result;
use crate::renderer::backend::ProgramHandle;
use crate::renderer::effects::EffectsState;
use crate::renderer::graph::builder::{GroupDesc, ProgramSource};
use crate::renderer::graph::downsample::recursive_downsample;
use crate::renderer::graph::pass::{Pass, PassState, TexRef};
use crate::renderer::graph::recorder::Recorder;
use crate::renderer::pipeline::{Program, SampleKind, ShaderInterface, ShaderKey, ShaderVariant};
use crate::renderer::resources::{FbSlot, TexSlot};

/// A display program, bound by the recorder rather than through a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayProgram {
    pub key: ShaderKey,
    pub program: ProgramHandle,
}

pub struct CommonPasses {
    /// Box filter of `color_src` into its next mip.
    pub downsample: Pass,
    pub display_color: DisplayProgram,
    pub display_depth: DisplayProgram,
}

impl CommonPasses {
    pub(crate) fn build(src: &mut ProgramSource<'_>) -> Option<Self> {
        let group = src.group(
            GroupDesc::new(ShaderKey::plain(Program::Downsample))
                .color("source", TexRef::ColorSource),
        )?;
        let downsample = Pass::new("Downsample", PassState::WRITE_COLOR).with_group(group);

        let mut display = |key: ShaderKey, kind: SampleKind| {
            let iface = ShaderInterface {
                textures: vec![("source", kind)],
                ..Default::default()
            };
            src.cache
                .get_or_compile(src.backend, src.library, key, &iface)
                .map(|program| DisplayProgram { key, program })
        };
        let display_color = display(ShaderKey::plain(Program::Display), SampleKind::Color)?;
        let display_depth = display(
            ShaderKey::new(Program::Display, ShaderVariant::INPUT_DEPTH),
            SampleKind::Depth,
        )?;

        Some(Self {
            downsample,
            display_color,
            display_depth,
        })
    }

    /// Filters `tex` into a mip chain of at most `max_levels` levels.
    ///
    /// Returns the number of valid levels, mip 0 included.
    pub fn downsample_buffer(
        &self,
        rec: &mut Recorder<'_>,
        fx: &mut EffectsState,
        fb: FbSlot,
        tex: TexSlot,
        max_levels: u32,
    ) -> Result<u32> {
        fx.color_src = tex;
        let fx = &*fx;
        recursive_downsample(rec, fb, tex, max_levels, |rec, _| {
            rec.draw(fx, &self.downsample)
        })
    }

    /// Sends `slot` to the display target.
    pub fn display(&self, rec: &mut Recorder<'_>, slot: TexSlot) -> Result<()> {
        let is_depth = rec.allocator().desc(slot).is_some_and(|d| d.format.is_depth());
        let program = if is_depth {
            self.display_depth
        } else {
            self.display_color
        };
        rec.display(program.key, program.program, slot)
    }
}
