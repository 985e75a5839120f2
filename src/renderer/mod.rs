//! Post-Processing Engine
//!
//! [`PostFxEngine`] drives the screen-space effect pipeline of any number of
//! viewports over one [`GpuBackend`].
//!
//! # Frame Flow
//!
//! ```text
//!   begin_frame ─► resolve options ─► build passes ─► sync resources ─► rebuild
//!        │
//!        │   host renders the scene into Main (Color + SceneDepth [+ SSR inputs])
//!        ▼
//!   create_minmax_buffer ─► do_volumetrics ─► do_ssr ─► draw_effects ─► FrameOutput
//! ```
//!
//! [`PostFxEngine::render_frame`] runs the whole sequence for hosts that
//! draw the scene elsewhere.
//!
//! # Ownership
//!
//! - the engine owns the backend, the shader library and the variant cache
//! - each viewport owns its [`ResourceAllocator`], [`PassGraph`] and
//!   [`EffectsState`]
//! - host textures enter through [`PostFxEngine::import_texture`] and are
//!   never destroyed by the engine

pub mod backend;
pub mod context;
pub mod effects;
pub mod graph;
pub mod pipeline;
pub mod resources;

use glam::Mat4;
use slotmap::SlotMap;

use crate::errors::{PostFxError, Result};
use crate::settings::{DebugView, PostFxConfig};

use self::backend::GpuBackend;
use self::context::FrameInput;
use self::effects::{EffectFlags, EffectsState, FrameChanges, resolve, sync_resources};
use self::graph::{CommandList, PassGraph, PostChain, ProgramSource, Recorder, draw_effects};
use self::pipeline::{ShaderLibrary, ShaderVariantCache};
use self::resources::{
    ExternalBlock, FbSlot, ResourceAllocator, TexSlot, TextureDesc, TextureId,
};

slotmap::new_key_type! {
    /// Handle of a viewport created by [`PostFxEngine::create_viewport`].
    pub struct ViewportId;
}

/// Result of one frame's post chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutput {
    /// Texture handed to display.
    pub final_color: TextureId,
    /// Slot `final_color` was displayed from.
    pub displayed: TexSlot,
    /// History is not converged yet; render another frame.
    pub redraw_requested: bool,
    /// Effects that ran.
    pub enabled: EffectFlags,
    /// Ping-pong swaps performed by the chain.
    pub swaps: u32,
    /// Color/history exchanges performed by the chain.
    pub exchanges: u32,
    /// View-projection stored for the next frame's reprojection.
    pub past_view_projection: Mat4,
}

/// Per-viewport state.
pub struct ViewportEffects {
    state: EffectsState,
    allocator: ResourceAllocator,
    passes: PassGraph,
    size: Option<(u32, u32)>,
    last_enabled: EffectFlags,
    debug: Option<DebugView>,
}

impl ViewportEffects {
    fn new() -> Self {
        Self {
            state: EffectsState::new(),
            allocator: ResourceAllocator::new(),
            passes: PassGraph::new(),
            size: None,
            last_enabled: EffectFlags::empty(),
            debug: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> &EffectsState {
        &self.state
    }

    #[inline]
    #[must_use]
    pub fn allocator(&self) -> &ResourceAllocator {
        &self.allocator
    }

    #[inline]
    #[must_use]
    pub fn passes(&self) -> &PassGraph {
        &self.passes
    }

    /// Texture currently behind `slot`, for hosts rendering into it.
    #[inline]
    #[must_use]
    pub fn texture(&self, slot: TexSlot) -> Option<TextureId> {
        self.allocator.texture(slot)
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// Records `f` into a fresh command list.
    fn record<T>(
        &mut self,
        f: impl FnOnce(&mut Recorder<'_>, &mut EffectsState, &PassGraph) -> Result<T>,
    ) -> Result<(T, CommandList)> {
        let mut commands = CommandList::new();
        let mut rec = Recorder::new(&mut self.allocator, &mut commands, self.state.viewport);
        let value = f(&mut rec, &mut self.state, &self.passes)?;
        Ok((value, commands))
    }
}

pub struct PostFxEngine<B: GpuBackend> {
    backend: B,
    library: ShaderLibrary,
    shaders: ShaderVariantCache,
    config: PostFxConfig,
    viewports: SlotMap<ViewportId, ViewportEffects>,
}

impl<B: GpuBackend> PostFxEngine<B> {
    /// Engine using the embedded shader templates.
    pub fn new(backend: B, config: PostFxConfig) -> Result<Self> {
        let library = ShaderLibrary::new(config.max_bloom_step)?;
        Ok(Self::with_library(backend, library, config))
    }

    #[must_use]
    pub fn with_library(backend: B, library: ShaderLibrary, config: PostFxConfig) -> Self {
        Self {
            backend,
            library,
            shaders: ShaderVariantCache::new(),
            config,
            viewports: SlotMap::with_key(),
        }
    }

    #[inline]
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &PostFxConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn shader_cache(&self) -> &ShaderVariantCache {
        &self.shaders
    }

    // ========================================================================
    // Viewports
    // ========================================================================

    pub fn create_viewport(&mut self) -> ViewportId {
        self.viewports.insert(ViewportEffects::new())
    }

    #[must_use]
    pub fn viewport(&self, id: ViewportId) -> Option<&ViewportEffects> {
        self.viewports.get(id)
    }

    /// Releases every resource of the viewport, imports unregistered.
    pub fn release_viewport(&mut self, id: ViewportId) {
        if let Some(mut vp) = self.viewports.remove(id) {
            vp.allocator.teardown(&mut self.backend);
            log::info!("Released viewport {id:?}");
        }
    }

    fn viewport_mut(&mut self, id: ViewportId) -> Result<&mut ViewportEffects> {
        self.viewports
            .get_mut(id)
            .ok_or_else(|| PostFxError::UnknownViewport(format!("{id:?}")))
    }

    /// Binds a host texture to `slot`: the scene depth or one of the
    /// [`TexSlot::External`] pools.
    pub fn import_texture(
        &mut self,
        id: ViewportId,
        slot: TexSlot,
        desc: TextureDesc,
    ) -> Result<TextureId> {
        let vp = self
            .viewports
            .get_mut(id)
            .ok_or_else(|| PostFxError::UnknownViewport(format!("{id:?}")))?;
        vp.allocator.import_texture(&mut self.backend, slot, desc)
    }

    /// Replaces a host uniform block, shared by every viewport.
    pub fn set_uniform_block(&mut self, block: ExternalBlock, data: &[u8]) {
        self.backend.set_uniform_block(block, data);
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Resolves the frame's effects and prepares passes and resources.
    pub fn begin_frame(&mut self, id: ViewportId, input: &FrameInput<'_>) -> Result<FrameChanges> {
        let vp = self
            .viewports
            .get_mut(id)
            .ok_or_else(|| PostFxError::UnknownViewport(format!("{id:?}")))?;

        let size = input.view.size();
        let first_frame = vp.size != Some(size);
        if first_frame && vp.size.is_some() {
            log::info!("Viewport resized to {}x{}", size.0, size.1);
            vp.allocator.release_all(&mut self.backend);
            vp.passes.clear();
            vp.last_enabled = EffectFlags::empty();
        }
        vp.size = Some(size);

        let wanted = resolve(input, &self.config, &mut vp.state);
        if first_frame {
            vp.state.prev_view_projection = vp.state.view_projection;
        }

        let volume = input.scene.world_volume;
        let mut src = ProgramSource {
            backend: &mut self.backend,
            library: &self.library,
            cache: &mut self.shaders,
        };
        vp.state.enabled = vp.passes.prepare(&mut src, &vp.state, wanted, volume);

        let changes = sync_resources(
            &mut vp.allocator,
            &mut self.backend,
            &mut vp.state,
            vp.last_enabled,
            self.config.max_bloom_step,
        )?;
        vp.state.valid_double_buffer = changes.history_valid;

        let mut src = ProgramSource {
            backend: &mut self.backend,
            library: &self.library,
            cache: &mut self.shaders,
        };
        vp.passes
            .rebuild(&mut src, &vp.state, changes.recreated, volume);

        vp.last_enabled = vp.state.enabled;
        vp.debug = input.settings.debug_view();
        Ok(changes)
    }

    /// Builds the Hi-Z pyramids from `depth`, or from one of its layers.
    ///
    /// Returns the number of levels in each pyramid.
    pub fn create_minmax_buffer(
        &mut self,
        id: ViewportId,
        depth: TexSlot,
        layer: Option<u32>,
    ) -> Result<u32> {
        let max_levels = self.config.hiz_max_levels;
        let (levels, commands) = self.viewport_mut(id)?.record(|rec, fx, passes| {
            match &passes.hiz {
                Some(hiz) => hiz.create_minmax_buffer(rec, fx, depth, layer, max_levels),
                None => Ok(0),
            }
        })?;
        self.backend.submit(&commands)?;
        Ok(levels)
    }

    /// Filters `tex` into its mip chain through `fb`. Returns the number of
    /// valid levels.
    pub fn downsample_buffer(
        &mut self,
        id: ViewportId,
        fb: FbSlot,
        tex: TexSlot,
        max_levels: u32,
    ) -> Result<u32> {
        let (levels, commands) = self.viewport_mut(id)?.record(|rec, fx, passes| {
            match &passes.common {
                Some(common) => common.downsample_buffer(rec, fx, fb, tex, max_levels),
                None => Ok(1),
            }
        })?;
        self.backend.submit(&commands)?;
        Ok(levels)
    }

    /// Integrates and composites the world volume into the main target.
    pub fn do_volumetrics(&mut self, id: ViewportId) -> Result<()> {
        let ((), commands) = self.viewport_mut(id)?.record(|rec, fx, passes| {
            match &passes.volumetric {
                Some(volumetric) if fx.is_enabled(EffectFlags::VOLUMETRIC) => {
                    volumetric.record(rec, fx)
                }
                _ => Ok(()),
            }
        })?;
        self.submit_nonempty(&commands)
    }

    /// Traces and composites screen-space reflections into the main target.
    pub fn do_ssr(&mut self, id: ViewportId) -> Result<()> {
        let history_levels = self.config.history_max_levels;
        let ((), commands) = self.viewport_mut(id)?.record(|rec, fx, passes| {
            match (&passes.ssr, &passes.common) {
                (Some(ssr), Some(common)) if fx.is_enabled(EffectFlags::SSR) => {
                    ssr.record(rec, fx, common, history_levels)
                }
                _ => Ok(()),
            }
        })?;
        self.submit_nonempty(&commands)
    }

    /// Runs motion blur, depth of field and bloom, then displays the result.
    pub fn draw_effects(&mut self, id: ViewportId) -> Result<FrameOutput> {
        let max_idle = self.config.transient_max_idle_frames;
        let vp = self
            .viewports
            .get_mut(id)
            .ok_or_else(|| PostFxError::UnknownViewport(format!("{id:?}")))?;

        let debug = vp.debug;
        let (outcome, commands) = vp.record(|rec, fx, passes| {
            let chain = PostChain {
                common: passes.common.as_ref(),
                motion_blur: passes.motion_blur.as_ref(),
                dof: passes.dof.as_ref(),
                bloom: passes.bloom.as_ref(),
            };
            draw_effects(rec, fx, &chain, debug)
        })?;
        self.backend.submit(&commands)?;
        vp.allocator.end_frame(&mut self.backend, max_idle);

        Ok(FrameOutput {
            final_color: outcome.final_color,
            displayed: outcome.displayed,
            redraw_requested: outcome.redraw_requested,
            enabled: vp.state.enabled,
            swaps: outcome.swaps,
            exchanges: outcome.exchanges,
            past_view_projection: vp.state.prev_view_projection,
        })
    }

    /// The complete frame for a scene already rendered into the viewport's
    /// main target.
    pub fn render_frame(&mut self, id: ViewportId, input: &FrameInput<'_>) -> Result<FrameOutput> {
        self.begin_frame(id, input)?;
        self.create_minmax_buffer(id, TexSlot::SceneDepth, None)?;
        self.do_volumetrics(id)?;
        self.do_ssr(id)?;
        self.draw_effects(id)
    }

    fn submit_nonempty(&mut self, commands: &CommandList) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }
        self.backend.submit(commands)
    }

    /// Releases every viewport and compiled program.
    pub fn shutdown(&mut self) {
        for (_, mut vp) in self.viewports.drain() {
            vp.allocator.teardown(&mut self.backend);
        }
        self.shaders.teardown(&mut self.backend);
        log::info!("Post-processing engine shut down");
    }
}
