//! Command recorder.
//!
//! Translates the scheduler's attach / bind / clear / draw sequence into a
//! [`CommandList`], resolving slots and indirections at the moment each
//! command is recorded.
//!
//! Binding snapshots the framebuffer's current attachments. Changing an
//! attachment afterwards has no effect on the bound target until the next
//! [`Recorder::bind`].

use smallvec::SmallVec;

use super::commands::{
    BoundTarget, Command, CommandList, DrawCall, DrawKind, TargetView, TextureBinding,
};
use super::pass::{Pass, PassState, Primitive, ShadingGroup};
use crate::errors::{PostFxError, Result};
use crate::renderer::backend::ProgramHandle;
use crate::renderer::effects::EffectsState;
use crate::renderer::pipeline::{SampleKind, ShaderKey};
use crate::renderer::resources::{AttachPoint, FbSlot, ResourceAllocator, TexSlot};

pub struct Recorder<'a> {
    allocator: &'a mut ResourceAllocator,
    commands: &'a mut CommandList,
    bound: Option<FbSlot>,
    /// Size used for framebuffers without attachments.
    viewport: (u32, u32),
    /// Restricts sampling of one texture to a single mip.
    lod_restriction: Option<(TexSlot, u32)>,
}

impl<'a> Recorder<'a> {
    pub fn new(
        allocator: &'a mut ResourceAllocator,
        commands: &'a mut CommandList,
        viewport: (u32, u32),
    ) -> Self {
        Self {
            allocator,
            commands,
            bound: None,
            viewport,
            lod_restriction: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn allocator(&self) -> &ResourceAllocator {
        self.allocator
    }

    #[inline]
    #[must_use]
    pub fn bound(&self) -> Option<FbSlot> {
        self.bound
    }

    pub fn attach(&mut self, fb: FbSlot, point: AttachPoint, slot: TexSlot, mip: u32) {
        self.allocator.attach(fb, point, slot, mip);
    }

    pub fn detach(&mut self, slot: TexSlot) {
        self.allocator.detach(slot);
    }

    pub fn detach_all(&mut self, fb: FbSlot) {
        self.allocator.detach_all(fb);
    }

    /// Exchanges the textures behind two slots. Commands already recorded
    /// keep the textures they resolved.
    pub fn exchange(&mut self, a: TexSlot, b: TexSlot) {
        self.allocator.swap_textures(a, b);
    }

    /// Sampling of `slot` sees only `mip` until [`Recorder::clear_lod_restriction`].
    pub fn restrict_lod(&mut self, slot: TexSlot, mip: u32) {
        self.lod_restriction = Some((slot, mip));
    }

    pub fn clear_lod_restriction(&mut self) {
        self.lod_restriction = None;
    }

    pub fn push_group(&mut self, name: &'static str) {
        self.commands.push(Command::PushGroup(name));
    }

    pub fn pop_group(&mut self) {
        self.commands.push(Command::PopGroup);
    }

    /// Binds `fb` with its current attachments.
    pub fn bind(&mut self, fb: FbSlot) -> Result<()> {
        let framebuffer = self
            .allocator
            .framebuffer(fb)
            .ok_or_else(|| PostFxError::UnboundFramebuffer(fb.to_string()))?;

        let mut colors = SmallVec::new();
        let mut depth = None;
        for attachment in framebuffer.attachments() {
            let view = TargetView {
                slot: attachment.slot,
                texture: self.allocator.require_texture(attachment.slot)?,
                mip: attachment.mip,
            };
            match attachment.point {
                AttachPoint::Color(index) => colors.push((index, view)),
                AttachPoint::Depth => depth = Some(view),
            }
        }
        colors.sort_by_key(|(index, _)| *index);

        let size = self
            .allocator
            .framebuffer_size(fb)
            .unwrap_or(self.viewport);

        log::trace!("Bind {fb} ({}x{})", size.0, size.1);
        self.commands.push(Command::Bind(BoundTarget {
            fb,
            colors,
            depth,
            size,
        }));
        self.bound = Some(fb);
        Ok(())
    }

    pub fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>) -> Result<()> {
        if self.bound.is_none() {
            return Err(PostFxError::NoBoundFramebuffer("clear".to_string()));
        }
        self.commands.push(Command::Clear { color, depth });
        Ok(())
    }

    /// Records every group of `pass` against the bound framebuffer.
    pub fn draw(&mut self, fx: &EffectsState, pass: &Pass) -> Result<()> {
        if self.bound.is_none() {
            return Err(PostFxError::NoBoundFramebuffer(pass.name.to_string()));
        }
        for group in &pass.groups {
            let call = self.draw_call(fx, pass.name, pass.state, group)?;
            log::trace!("Draw {} with {}", pass.name, call.key.label());
            self.commands.push(Command::Draw(call));
        }
        Ok(())
    }

    /// Sends `slot` to the host display target.
    pub fn display(
        &mut self,
        key: ShaderKey,
        program: ProgramHandle,
        slot: TexSlot,
    ) -> Result<()> {
        let kind = if self.allocator.desc(slot).is_some_and(|d| d.format.is_depth()) {
            SampleKind::Depth
        } else {
            SampleKind::Color
        };
        let texture = self.allocator.require_texture(slot)?;
        self.commands.push(Command::Display(DrawCall {
            pass: "Display",
            key,
            program,
            state: PassState::WRITE_COLOR,
            textures: smallvec::smallvec![TextureBinding {
                name: "source",
                slot,
                texture,
                base_mip: 0,
                mip_count: Some(1),
                kind,
            }],
            uniforms: Vec::new(),
            blocks: SmallVec::new(),
            primitive: DrawKind::Fullscreen,
            outputs: 1,
        }));
        Ok(())
    }

    fn draw_call(
        &self,
        fx: &EffectsState,
        pass: &'static str,
        state: PassState,
        group: &ShadingGroup,
    ) -> Result<DrawCall> {
        let mut textures = SmallVec::new();
        for input in &group.textures {
            let slot = input.source.resolve(fx);
            let texture = self.allocator.require_texture(slot)?;
            let (base_mip, mip_count) = match self.lod_restriction {
                Some((restricted, mip)) if restricted == slot => (mip, Some(1)),
                _ => (0, None),
            };
            textures.push(TextureBinding {
                name: input.name,
                slot,
                texture,
                base_mip,
                mip_count,
                kind: input.kind,
            });
        }

        let primitive = match group.primitive {
            Primitive::Fullscreen => DrawKind::Fullscreen,
            Primitive::SpritesPerTexel(slot) => {
                let (w, h) = self
                    .allocator
                    .desc(slot)
                    .map(|d| (d.width, d.height))
                    .ok_or_else(|| PostFxError::UnboundTexture(slot.to_string()))?;
                DrawKind::Sprites { count: w * h }
            }
        };

        Ok(DrawCall {
            pass,
            key: group.key,
            program: group.program,
            state,
            textures,
            uniforms: group
                .uniforms
                .iter()
                .map(|(name, u)| (*name, u.resolve(fx)))
                .collect(),
            blocks: group.blocks.iter().map(|(_, b)| *b).collect(),
            primitive,
            outputs: group.outputs,
        })
    }
}
