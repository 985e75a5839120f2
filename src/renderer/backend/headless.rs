//! Headless backend.
//!
//! Implements [`GpuBackend`] without a device. Every submitted stream is
//! validated the way a real device would reject it, then recorded so tests
//! can inspect what a frame did:
//!
//! - draws and clears need a bound framebuffer
//! - every referenced texture and program must exist
//! - attachments of one target must share a size, at an existing mip
//! - a draw may not sample a texture mip it renders into
//!
//! Compilation can be made to fail for chosen programs.

use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;

use super::{GpuBackend, ProgramHandle};
use crate::errors::{PostFxError, Result};
use crate::renderer::graph::commands::{BoundTarget, Command, CommandList, DrawCall};
use crate::renderer::pipeline::{Program, SampleKind, ShaderInterface};
use crate::renderer::resources::{ExternalBlock, TextureDesc, TextureId};

#[derive(Debug, Clone)]
struct HeadlessTexture {
    desc: TextureDesc,
    imported: bool,
}

#[derive(Debug, Clone)]
struct HeadlessProgram {
    label: String,
    interface: ShaderInterface,
}

/// A validated draw and the target it rendered into.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub target: BoundTarget,
    pub call: DrawCall,
}

#[derive(Default)]
pub struct HeadlessBackend {
    textures: FxHashMap<TextureId, HeadlessTexture>,
    programs: SlotMap<ProgramHandle, HeadlessProgram>,
    failing: FxHashSet<Program>,
    blocks: FxHashMap<ExternalBlock, Vec<u8>>,

    created_textures: usize,
    destroyed_textures: usize,
    compiled_programs: usize,

    submissions: Vec<CommandList>,
    draws: Vec<DrawRecord>,
    clears: Vec<(BoundTarget, Option<[f32; 4]>, Option<f32>)>,
    displays: Vec<DrawCall>,
}

impl HeadlessBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every variant of `program` fail to compile.
    pub fn fail_program(&mut self, program: Program) {
        self.failing.insert(program);
    }

    pub fn restore_program(&mut self, program: Program) {
        self.failing.remove(&program);
    }

    fn is_failing(&self, label: &str) -> bool {
        self.failing.iter().any(|p| {
            let name = p.template_name();
            label == name
                || label
                    .strip_prefix(name)
                    .is_some_and(|rest| rest.starts_with('[') || rest.starts_with('#'))
        })
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    #[must_use]
    pub fn live_texture_count(&self) -> usize {
        self.textures.values().filter(|t| !t.imported).count()
    }

    #[must_use]
    pub fn has_texture(&self, id: TextureId) -> bool {
        self.textures.contains_key(&id)
    }

    #[must_use]
    pub fn texture_desc(&self, id: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&id).map(|t| &t.desc)
    }

    #[must_use]
    pub fn created_texture_count(&self) -> usize {
        self.created_textures
    }

    #[must_use]
    pub fn destroyed_texture_count(&self) -> usize {
        self.destroyed_textures
    }

    /// Successful compilations so far.
    #[must_use]
    pub fn compiled_program_count(&self) -> usize {
        self.compiled_programs
    }

    #[must_use]
    pub fn live_program_count(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn program_label(&self, program: ProgramHandle) -> Option<&str> {
        self.programs.get(program).map(|p| p.label.as_str())
    }

    #[must_use]
    pub fn uniform_block(&self, block: ExternalBlock) -> Option<&[u8]> {
        self.blocks.get(&block).map(Vec::as_slice)
    }

    #[must_use]
    pub fn submissions(&self) -> &[CommandList] {
        &self.submissions
    }

    #[must_use]
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    #[must_use]
    pub fn clears(&self) -> &[(BoundTarget, Option<[f32; 4]>, Option<f32>)] {
        &self.clears
    }

    #[must_use]
    pub fn displays(&self) -> &[DrawCall] {
        &self.displays
    }

    /// Forgets recorded streams. Resources are kept.
    pub fn clear_log(&mut self) {
        self.submissions.clear();
        self.draws.clear();
        self.clears.clear();
        self.displays.clear();
    }

    // ========================================================================
    // Validation
    // ========================================================================

    fn texture(&self, id: TextureId) -> Result<&HeadlessTexture> {
        self.textures
            .get(&id)
            .ok_or_else(|| PostFxError::UnknownTexture(format!("{id:?}")))
    }

    fn validate_target(&self, target: &BoundTarget) -> Result<()> {
        let mut size = None;
        let views = target
            .colors
            .iter()
            .map(|(_, v)| (v, false))
            .chain(target.depth.iter().map(|v| (v, true)));
        for (view, is_depth) in views {
            let texture = self.texture(view.texture)?;
            if texture.desc.format.is_depth() != is_depth || view.mip >= texture.desc.mip_level_count()
            {
                return Err(PostFxError::UnboundTexture(format!(
                    "{} cannot be attached to {} at mip {}",
                    view.slot, target.fb, view.mip
                )));
            }
            let extent = texture.desc.mip_extent(view.mip);
            if *size.get_or_insert(extent) != extent {
                return Err(PostFxError::UnboundTexture(format!(
                    "{} size mismatch in {}",
                    view.slot, target.fb
                )));
            }
        }
        Ok(())
    }

    fn validate_draw(&self, target: Option<&BoundTarget>, call: &DrawCall) -> Result<()> {
        let program = self
            .programs
            .get(call.program)
            .ok_or_else(|| PostFxError::UnknownProgram(call.key.label()))?;

        let interface = &program.interface;
        if interface.textures.len() != call.textures.len()
            || interface.uniforms.len() != call.uniforms.len()
            || interface.blocks.len() != call.blocks.len()
        {
            return Err(PostFxError::ShaderCompilation {
                program: program.label.clone(),
                message: format!("draw in '{}' does not match the program interface", call.pass),
            });
        }

        for binding in &call.textures {
            let texture = self.texture(binding.texture)?;
            if texture.desc.format.is_depth() != binding.kind.is_depth() {
                return Err(PostFxError::UnboundTexture(format!(
                    "{} bound as {:?} in '{}'",
                    binding.slot, binding.kind, call.pass
                )));
            }

            let Some(target) = target else { continue };
            let attached = target
                .colors
                .iter()
                .map(|(_, v)| v)
                .chain(target.depth.iter())
                .any(|v| v.texture == binding.texture && binding.covers_mip(v.mip));
            if attached {
                return Err(PostFxError::FeedbackLoop {
                    pass: call.pass.to_string(),
                    texture: binding.slot.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl GpuBackend for HeadlessBackend {
    fn create_texture(&mut self, id: TextureId, desc: &TextureDesc) -> Result<()> {
        self.textures.insert(
            id,
            HeadlessTexture {
                desc: *desc,
                imported: false,
            },
        );
        self.created_textures += 1;
        Ok(())
    }

    fn import_texture(&mut self, id: TextureId, desc: &TextureDesc) -> Result<()> {
        self.textures.insert(
            id,
            HeadlessTexture {
                desc: *desc,
                imported: true,
            },
        );
        Ok(())
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(&id).is_some_and(|t| !t.imported) {
            self.destroyed_textures += 1;
        }
    }

    fn compile_program(
        &mut self,
        label: &str,
        source: &str,
        interface: &ShaderInterface,
    ) -> Result<ProgramHandle> {
        if self.is_failing(label) || source.trim().is_empty() {
            return Err(PostFxError::ShaderCompilation {
                program: label.to_string(),
                message: "rejected by headless backend".to_string(),
            });
        }
        self.compiled_programs += 1;
        Ok(self.programs.insert(HeadlessProgram {
            label: label.to_string(),
            interface: interface.clone(),
        }))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(program);
    }

    fn set_uniform_block(&mut self, block: ExternalBlock, data: &[u8]) {
        self.blocks.insert(block, data.to_vec());
    }

    fn submit(&mut self, commands: &CommandList) -> Result<()> {
        let mut bound: Option<BoundTarget> = None;
        let mut depth = 0usize;
        let mut draws = Vec::new();
        let mut clears = Vec::new();
        let mut displays = Vec::new();

        for command in commands.iter() {
            match command {
                Command::PushGroup(_) => depth += 1,
                Command::PopGroup => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        PostFxError::NoBoundFramebuffer("unbalanced debug group".to_string())
                    })?;
                }
                Command::Bind(target) => {
                    self.validate_target(target)?;
                    bound = Some(target.clone());
                }
                Command::Clear { color, depth } => {
                    let target = bound
                        .as_ref()
                        .ok_or_else(|| PostFxError::NoBoundFramebuffer("clear".to_string()))?;
                    clears.push((target.clone(), *color, *depth));
                }
                Command::Draw(call) => {
                    let target = bound
                        .as_ref()
                        .ok_or_else(|| PostFxError::NoBoundFramebuffer(call.pass.to_string()))?;
                    self.validate_draw(Some(target), call)?;
                    draws.push(DrawRecord {
                        target: target.clone(),
                        call: call.clone(),
                    });
                }
                Command::Display(call) => {
                    self.validate_draw(None, call)?;
                    displays.push(call.clone());
                }
            }
        }

        self.draws.extend(draws);
        self.clears.extend(clears);
        self.displays.extend(displays);
        self.submissions.push(commands.clone());
        Ok(())
    }
}
