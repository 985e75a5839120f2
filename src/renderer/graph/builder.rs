//! Pass Graph Builder
//!
//! Owns the built passes of one viewport and decides when they are rebuilt.
//!
//! ```text
//!   prepare(flags)                       after sync_resources()
//!     │                                     │
//!     ├─ enabled & (unbuilt | key changed)  └─ rebuild(recreated)
//!     │     └─ build ── fails ──► bit masked for the frame
//!     └─ disabled ──► passes dropped
//! ```
//!
//! A build key captures the settings a pass bakes into its variant
//! selection (bloom quality, ray count, transmittance mode...). Everything
//! else is read through indirections at record time and never forces a
//! rebuild.

use rustc_hash::FxHashMap;

use super::pass::{Primitive, ShadingGroup, TexRef, TextureInput, UniformRef, interface_of};
use super::passes::{
    BloomPasses, CommonPasses, DofPasses, HizPasses, MotionBlurPasses, SsrPasses,
    VolumetricPasses,
};
use crate::renderer::backend::GpuBackend;
use crate::renderer::context::WorldVolume;
use crate::renderer::effects::{EffectFlags, EffectsState};
use crate::renderer::pipeline::{SampleKind, ShaderKey, ShaderLibrary, ShaderVariantCache};
use crate::renderer::resources::{ExternalBlock, ExternalTexture, TexSlot};

// ============================================================================
// Group declaration
// ============================================================================

/// Inputs of a shading group, before its program exists.
#[derive(Debug, Clone)]
pub struct GroupDesc {
    key: ShaderKey,
    textures: Vec<TextureInput>,
    uniforms: Vec<(&'static str, UniformRef)>,
    blocks: Vec<(&'static str, ExternalBlock)>,
    primitive: Primitive,
    outputs: u8,
}

impl GroupDesc {
    #[must_use]
    pub fn new(key: ShaderKey) -> Self {
        Self {
            key,
            textures: Vec::new(),
            uniforms: Vec::new(),
            blocks: Vec::new(),
            primitive: Primitive::Fullscreen,
            outputs: 1,
        }
    }

    #[must_use]
    pub fn color(mut self, name: &'static str, source: TexRef) -> Self {
        self.textures.push(TextureInput::color(name, source));
        self
    }

    #[must_use]
    pub fn depth(mut self, name: &'static str, source: TexRef) -> Self {
        self.textures.push(TextureInput::depth(name, source));
        self
    }

    #[must_use]
    pub fn sampled(mut self, name: &'static str, source: TexRef, kind: SampleKind) -> Self {
        self.textures.push(TextureInput { name, source, kind });
        self
    }

    /// A host texture, sampled the way its kind requires.
    #[must_use]
    pub fn external(self, name: &'static str, texture: ExternalTexture) -> Self {
        self.sampled(
            name,
            TexRef::Slot(TexSlot::External(texture)),
            texture.sample_kind(),
        )
    }

    #[must_use]
    pub fn uniform(mut self, name: &'static str, value: UniformRef) -> Self {
        self.uniforms.push((name, value));
        self
    }

    #[must_use]
    pub fn block(mut self, name: &'static str, block: ExternalBlock) -> Self {
        self.blocks.push((name, block));
        self
    }

    /// Draws one sprite per texel of `slot` instead of a fullscreen triangle.
    #[must_use]
    pub fn sprites(mut self, slot: TexSlot) -> Self {
        self.primitive = Primitive::SpritesPerTexel(slot);
        self
    }

    #[must_use]
    pub fn outputs(mut self, outputs: u8) -> Self {
        self.outputs = outputs;
        self
    }

    fn into_group(self, program: crate::renderer::backend::ProgramHandle) -> ShadingGroup {
        ShadingGroup {
            key: self.key,
            program,
            textures: self.textures,
            uniforms: self.uniforms,
            blocks: self.blocks,
            primitive: self.primitive,
            outputs: self.outputs,
        }
    }
}

// ============================================================================
// Program source
// ============================================================================

/// Compiles shading groups through the shared variant cache.
pub struct ProgramSource<'a> {
    pub backend: &'a mut dyn GpuBackend,
    pub library: &'a ShaderLibrary,
    pub cache: &'a mut ShaderVariantCache,
}

impl ProgramSource<'_> {
    /// `None` when the variant is unavailable.
    pub fn group(&mut self, desc: GroupDesc) -> Option<ShadingGroup> {
        let iface = interface_of(&desc.textures, &desc.uniforms, &desc.blocks);
        let program = self
            .cache
            .get_or_compile(self.backend, self.library, desc.key, &iface)?;
        Some(desc.into_group(program))
    }

    /// Like [`Self::group`], with the host material code spliced into the
    /// template.
    pub fn material_group(
        &mut self,
        desc: GroupDesc,
        material: &dyn WorldVolume,
    ) -> Option<ShadingGroup> {
        let iface = interface_of(&desc.textures, &desc.uniforms, &desc.blocks);
        let code = material.shader_code();
        let program = self.cache.get_or_compile_material(
            self.backend,
            self.library,
            desc.key,
            material.id(),
            &code,
            &iface,
        )?;
        Some(desc.into_group(program))
    }
}

// ============================================================================
// Pass graph
// ============================================================================

/// Effects with passes of their own. `DOUBLE_BUFFER` has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Built {
    MotionBlur,
    Bloom,
    Dof,
    Volumetric,
    Ssr,
}

impl Built {
    const ALL: [Self; 5] = [
        Self::MotionBlur,
        Self::Bloom,
        Self::Dof,
        Self::Volumetric,
        Self::Ssr,
    ];

    fn flag(self) -> EffectFlags {
        match self {
            Self::MotionBlur => EffectFlags::MOTION_BLUR,
            Self::Bloom => EffectFlags::BLOOM,
            Self::Dof => EffectFlags::DOF,
            Self::Volumetric => EffectFlags::VOLUMETRIC,
            Self::Ssr => EffectFlags::SSR,
        }
    }

    fn of(flag: EffectFlags) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.flag() == flag)
    }
}

#[derive(Default)]
pub struct PassGraph {
    pub common: Option<CommonPasses>,
    pub hiz: Option<HizPasses>,
    pub motion_blur: Option<MotionBlurPasses>,
    pub bloom: Option<BloomPasses>,
    pub dof: Option<DofPasses>,
    pub ssr: Option<SsrPasses>,
    pub volumetric: Option<VolumetricPasses>,

    build_keys: FxHashMap<Built, BuildKey>,
    build_counts: FxHashMap<Built, u32>,
    /// Built by the last `prepare`.
    fresh: EffectFlags,
}

impl PassGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds what `enabled` needs and drops what it no longer does.
    ///
    /// Returns `enabled` with the bits of effects that failed to build
    /// cleared.
    pub fn prepare(
        &mut self,
        src: &mut ProgramSource<'_>,
        fx: &EffectsState,
        enabled: EffectFlags,
        volume: Option<&dyn WorldVolume>,
    ) -> EffectFlags {
        if self.common.is_none() {
            self.common = CommonPasses::build(src);
        }
        if self.hiz.is_none() {
            self.hiz = HizPasses::build(src);
        }

        self.fresh = EffectFlags::empty();
        let mut available = enabled;
        for effect in Built::ALL {
            if !enabled.contains(effect.flag()) {
                self.drop_effect(effect);
                continue;
            }
            let key = build_key(effect, fx, volume);
            let stale = self.build_keys.get(&effect) != Some(&key);
            if (stale || !self.has(effect)) && !self.build(src, effect, fx, volume) {
                available.remove(effect.flag());
            }
        }

        // Reflections trace the Hi-Z pyramid and resolve from history.
        if self.hiz.is_none() || self.common.is_none() {
            available.remove(EffectFlags::SSR);
        }
        if !available.contains(EffectFlags::SSR) {
            self.drop_effect(Built::Ssr);
            available.remove(EffectFlags::DOUBLE_BUFFER);
        }
        available
    }

    /// Rebuilds effects whose owned resources were just recreated, unless
    /// the last `prepare` already built them.
    pub fn rebuild(
        &mut self,
        src: &mut ProgramSource<'_>,
        fx: &EffectsState,
        recreated: EffectFlags,
        volume: Option<&dyn WorldVolume>,
    ) {
        for effect in Built::ALL {
            let flag = effect.flag();
            if recreated.contains(flag)
                && !self.fresh.contains(flag)
                && fx.is_enabled(flag)
                && self.has(effect)
            {
                self.build(src, effect, fx, volume);
            }
        }
    }

    /// Drops every pass. Programs stay in the variant cache.
    pub fn clear(&mut self) {
        *self = Self {
            build_counts: std::mem::take(&mut self.build_counts),
            ..Self::default()
        };
    }

    /// Times the passes of `effect` were built.
    #[must_use]
    pub fn build_count(&self, effect: EffectFlags) -> u32 {
        Built::of(effect)
            .and_then(|b| self.build_counts.get(&b).copied())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_built(&self, effect: EffectFlags) -> bool {
        Built::of(effect).is_some_and(|b| self.has(b))
    }

    fn has(&self, effect: Built) -> bool {
        match effect {
            Built::MotionBlur => self.motion_blur.is_some(),
            Built::Bloom => self.bloom.is_some(),
            Built::Dof => self.dof.is_some(),
            Built::Volumetric => self.volumetric.is_some(),
            Built::Ssr => self.ssr.is_some(),
        }
    }

    fn build(
        &mut self,
        src: &mut ProgramSource<'_>,
        effect: Built,
        fx: &EffectsState,
        volume: Option<&dyn WorldVolume>,
    ) -> bool {
        let built = match effect {
            Built::MotionBlur => {
                self.motion_blur = MotionBlurPasses::build(src);
                self.motion_blur.is_some()
            }
            Built::Bloom => {
                self.bloom = BloomPasses::build(src, fx);
                self.bloom.is_some()
            }
            Built::Dof => {
                self.dof = DofPasses::build(src);
                self.dof.is_some()
            }
            Built::Volumetric => {
                self.volumetric = volume.and_then(|v| VolumetricPasses::build(src, fx, v));
                self.volumetric.is_some()
            }
            Built::Ssr => {
                self.ssr = SsrPasses::build(src, fx);
                self.ssr.is_some()
            }
        };

        if built {
            self.build_keys.insert(effect, build_key(effect, fx, volume));
            *self.build_counts.entry(effect).or_default() += 1;
            self.fresh |= effect.flag();
            log::debug!("Built passes for {effect:?}");
        } else {
            log::warn!("Passes for {effect:?} unavailable, effect disabled this frame");
            self.drop_effect(effect);
        }
        built
    }

    fn drop_effect(&mut self, effect: Built) {
        match effect {
            Built::MotionBlur => self.motion_blur = None,
            Built::Bloom => self.bloom = None,
            Built::Dof => self.dof = None,
            Built::Volumetric => self.volumetric = None,
            Built::Ssr => self.ssr = None,
        }
        self.build_keys.remove(&effect);
    }
}

/// Material id (volumetrics only) and structural flags.
type BuildKey = (Option<u64>, u64);

/// Settings an effect's passes depend on structurally.
fn build_key(effect: Built, fx: &EffectsState, volume: Option<&dyn WorldVolume>) -> BuildKey {
    match effect {
        Built::Bloom => (None, u64::from(fx.bloom.high_quality)),
        Built::Ssr => (
            None,
            (fx.ssr.ray_count as u64) << 1 | u64::from(fx.ssr.full_res),
        ),
        Built::Volumetric => {
            let v = &fx.volumetric;
            let mode = u64::from(v.use_lights)
                | u64::from(v.use_shadows) << 1
                | u64::from(v.colored_transmittance) << 2;
            (volume.map(|v| v.id()), mode)
        }
        Built::MotionBlur | Built::Dof => (None, 0),
    }
}
