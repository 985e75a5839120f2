//! Resource Lifetime
//!
//! Brings a viewport's textures and framebuffers in line with the resolved
//! effect set, once per frame, before any pass is recorded.
//!
//! ```text
//!   always        Color, SceneDepth, Main, Default, MinZ, MaxZ, Downsample
//!   DOUBLE_BUFFER ColorDoubleBuffer, DoubleBuffer
//!   MB|BLOOM|DOF  ColorPost, Effect
//!   BLOOM         BloomBlit, BloomDownsample(0..n), BloomUpsample(0..n-1)
//!   DOF           DofDown{Near,Far}, DofCoc, Dof{Far,Near}Blur
//!   VOLUMETRIC    Volumetric (+ VolumetricTransmit when colored)
//!   SSR           SsrNormalInput, SsrSpecRoughInput, SsrHit(0..rays)
//! ```
//!
//! Resources of disabled effects are released in the same call, and
//! host-owned inputs an enabled effect samples but the host never imported
//! get a 1×1 placeholder.

use super::EffectFlags;
use super::sharing::DofNearSource;
use super::state::EffectsState;
use crate::errors::Result;
use crate::renderer::backend::GpuBackend;
use crate::renderer::resources::{
    AttachPoint, ExternalTexture, FbSlot, ResourceAllocator, TexFormat, TexSlot, TextureDesc,
    TextureFlags,
};
use crate::settings::MAX_SSR_RAYS;

/// What the sync changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameChanges {
    pub newly_enabled: EffectFlags,
    pub newly_disabled: EffectFlags,
    /// Effects with at least one owned resource created this frame.
    pub recreated: EffectFlags,
    /// The color history survived from the previous frame.
    pub history_valid: bool,
}

/// Tracks recreation for one effect while ensuring its resources.
struct Sync<'a> {
    allocator: &'a mut ResourceAllocator,
    backend: &'a mut dyn GpuBackend,
    recreated: EffectFlags,
}

impl Sync<'_> {
    fn texture(&mut self, owner: EffectFlags, slot: TexSlot, desc: TextureDesc) -> Result<()> {
        if self
            .allocator
            .ensure_texture(self.backend, slot, desc)?
            .was_recreated
        {
            self.recreated |= owner;
        }
        Ok(())
    }

    fn framebuffer(
        &mut self,
        owner: EffectFlags,
        fb: FbSlot,
        layout: &[(AttachPoint, TexSlot)],
    ) -> Result<()> {
        if self.allocator.ensure_framebuffer(fb, layout).was_recreated {
            self.recreated |= owner;
        }
        Ok(())
    }

    fn release(&mut self, slots: &[TexSlot], fbs: &[FbSlot]) {
        for &slot in slots {
            self.allocator.release_texture(self.backend, slot);
        }
        for &fb in fbs {
            self.allocator.release_framebuffer(fb);
        }
    }
}

/// Ensures every resource `fx.enabled` needs and releases the rest.
///
/// `previous` is the enabled set of the last synced frame. `max_bloom_step`
/// bounds the bloom levels that may still be allocated.
pub fn sync_resources(
    allocator: &mut ResourceAllocator,
    backend: &mut dyn GpuBackend,
    fx: &mut EffectsState,
    previous: EffectFlags,
    max_bloom_step: u32,
) -> Result<FrameChanges> {
    let enabled = fx.enabled;
    let had_history = allocator.is_bound(TexSlot::ColorDoubleBuffer);
    let mut sync = Sync {
        allocator,
        backend,
        recreated: EffectFlags::empty(),
    };

    sync_scene_targets(&mut sync, fx)?;
    sync_double_buffer(&mut sync, fx)?;
    sync_ping_pong(&mut sync, enabled)?;
    sync_bloom(&mut sync, fx, max_bloom_step)?;
    sync_dof(&mut sync, fx)?;
    sync_volumetric(&mut sync, fx)?;
    sync_ssr(&mut sync, fx)?;
    sync_placeholders(&mut sync, enabled)?;

    let changes = FrameChanges {
        newly_enabled: enabled.difference(previous),
        newly_disabled: previous.difference(enabled),
        recreated: sync.recreated,
        history_valid: had_history && !sync.recreated.contains(EffectFlags::DOUBLE_BUFFER),
    };
    if !changes.newly_enabled.is_empty() || !changes.newly_disabled.is_empty() {
        log::debug!(
            "Effects enabled: {:?}, disabled: {:?}",
            changes.newly_enabled,
            changes.newly_disabled
        );
    }
    Ok(changes)
}

#[inline]
fn half(size: (u32, u32)) -> (u32, u32) {
    ((size.0 / 2).max(1), (size.1 / 2).max(1))
}

#[must_use]
pub(crate) fn color_desc(size: (u32, u32)) -> TextureDesc {
    TextureDesc::new(
        size.0,
        size.1,
        TexFormat::Rgba16,
        TextureFlags::FILTER | TextureFlags::MIPMAP,
    )
}

fn sync_scene_targets(sync: &mut Sync<'_>, fx: &EffectsState) -> Result<()> {
    let (w, h) = fx.viewport;
    let none = EffectFlags::empty();

    sync.texture(none, TexSlot::Color, color_desc(fx.viewport))?;
    if !sync.allocator.is_imported(TexSlot::SceneDepth) {
        let desc = TextureDesc::new(w, h, TexFormat::Depth, TextureFlags::empty());
        sync.texture(none, TexSlot::SceneDepth, desc)?;
    }

    // SSR inputs are rendered by the scene pass, so they live on Main.
    let mut main = vec![
        (AttachPoint::Color(0), TexSlot::Color),
        (AttachPoint::Depth, TexSlot::SceneDepth),
    ];
    if fx.is_enabled(EffectFlags::SSR) {
        let normal = TextureDesc::new(w, h, TexFormat::Rg16, TextureFlags::empty());
        let spec_rough = TextureDesc::new(w, h, TexFormat::Rgba16, TextureFlags::empty());
        sync.texture(EffectFlags::SSR, TexSlot::SsrNormalInput, normal)?;
        sync.texture(EffectFlags::SSR, TexSlot::SsrSpecRoughInput, spec_rough)?;
        main.push((AttachPoint::Color(1), TexSlot::SsrNormalInput));
        main.push((AttachPoint::Color(2), TexSlot::SsrSpecRoughInput));
    } else {
        sync.release(&[TexSlot::SsrNormalInput, TexSlot::SsrSpecRoughInput], &[]);
    }
    sync.framebuffer(none, FbSlot::Main, &main)?;
    sync.framebuffer(none, FbSlot::Default, &[])?;

    // Hi-Z pyramids are built every frame.
    let (hw, hh) = half(fx.viewport);
    let min_z = TextureDesc::new(
        hw,
        hh,
        TexFormat::Depth,
        TextureFlags::MIPMAP | TextureFlags::TEMP,
    );
    let max_z = TextureDesc::new(hw, hh, TexFormat::Depth, TextureFlags::MIPMAP);
    sync.texture(none, TexSlot::MinZ, min_z)?;
    sync.texture(none, TexSlot::MaxZ, max_z)?;
    sync.framebuffer(none, FbSlot::Downsample, &[(AttachPoint::Depth, TexSlot::MinZ)])
}

fn sync_double_buffer(sync: &mut Sync<'_>, fx: &EffectsState) -> Result<()> {
    if fx.is_enabled(EffectFlags::DOUBLE_BUFFER) {
        let owner = EffectFlags::DOUBLE_BUFFER | EffectFlags::SSR;
        sync.texture(owner, TexSlot::ColorDoubleBuffer, color_desc(fx.viewport))?;
        sync.framebuffer(
            owner,
            FbSlot::DoubleBuffer,
            &[(AttachPoint::Color(0), TexSlot::ColorDoubleBuffer)],
        )
    } else {
        sync.release(&[TexSlot::ColorDoubleBuffer], &[FbSlot::DoubleBuffer]);
        Ok(())
    }
}

fn sync_ping_pong(sync: &mut Sync<'_>, enabled: EffectFlags) -> Result<()> {
    if enabled.intersects(EffectFlags::POST) {
        // Only the viewport size matters here; Color already holds it.
        let Some(&color) = sync.allocator.desc(TexSlot::Color) else {
            return Ok(());
        };
        let desc = TextureDesc::new(
            color.width,
            color.height,
            TexFormat::Rgb11,
            TextureFlags::FILTER,
        );
        let owner = enabled & EffectFlags::POST;
        sync.texture(owner, TexSlot::ColorPost, desc)?;
        sync.framebuffer(
            owner,
            FbSlot::Effect,
            &[(AttachPoint::Color(0), TexSlot::ColorPost)],
        )
    } else {
        sync.release(&[TexSlot::ColorPost], &[FbSlot::Effect]);
        Ok(())
    }
}

fn sync_bloom(sync: &mut Sync<'_>, fx: &EffectsState, max_bloom_step: u32) -> Result<()> {
    let owner = EffectFlags::BLOOM;
    let count = if fx.is_enabled(owner) {
        fx.bloom.iteration_count
    } else {
        0
    };

    if count > 0 {
        let bloom = &fx.bloom;
        let rgb11 = |(w, h): (u32, u32)| TextureDesc::new(w, h, TexFormat::Rgb11, TextureFlags::FILTER);
        sync.texture(owner, TexSlot::BloomBlit, rgb11(bloom.blit_size))?;
        sync.framebuffer(
            owner,
            FbSlot::BloomBlit,
            &[(AttachPoint::Color(0), TexSlot::BloomBlit)],
        )?;
        for (i, &size) in bloom.down_sizes.iter().take(count as usize).enumerate() {
            let level = i as u8;
            sync.texture(owner, TexSlot::BloomDownsample(level), rgb11(size))?;
            sync.framebuffer(
                owner,
                FbSlot::BloomDown(level),
                &[(AttachPoint::Color(0), TexSlot::BloomDownsample(level))],
            )?;
            if i + 1 < count as usize {
                sync.texture(owner, TexSlot::BloomUpsample(level), rgb11(size))?;
                sync.framebuffer(
                    owner,
                    FbSlot::BloomAccum(level),
                    &[(AttachPoint::Color(0), TexSlot::BloomUpsample(level))],
                )?;
            }
        }
    } else {
        sync.release(&[TexSlot::BloomBlit], &[FbSlot::BloomBlit]);
    }

    // Levels past the current chain length.
    for i in count..max_bloom_step.max(count) {
        let level = i as u8;
        sync.release(&[TexSlot::BloomDownsample(level)], &[FbSlot::BloomDown(level)]);
    }
    for i in count.saturating_sub(1)..max_bloom_step.max(count) {
        let level = i as u8;
        sync.release(&[TexSlot::BloomUpsample(level)], &[FbSlot::BloomAccum(level)]);
    }
    Ok(())
}

fn sync_dof(sync: &mut Sync<'_>, fx: &mut EffectsState) -> Result<()> {
    let owner = EffectFlags::DOF;
    let bloom_down0 = fx.bloom.down_sizes.first().copied();
    let near_source = DofNearSource::select(fx.enabled, bloom_down0, fx.dof.size);

    if fx.is_enabled(owner) {
        if near_source != fx.dof.near_source && sync.allocator.release_framebuffer(FbSlot::DofDown) {
            log::debug!("Depth of field near field now uses {near_source:?}");
        }

        let (w, h) = fx.dof.size;
        match near_source {
            DofNearSource::Dedicated => {
                let desc = TextureDesc::new(w, h, TexFormat::Rgb11, TextureFlags::FILTER);
                sync.texture(owner, TexSlot::DofDownNear, desc)?;
            }
            DofNearSource::BloomDownsample0 => sync.release(&[TexSlot::DofDownNear], &[]),
        }
        let far = TextureDesc::new(w, h, TexFormat::Rgb11, TextureFlags::empty());
        let coc = TextureDesc::new(w, h, TexFormat::Rg16, TextureFlags::empty());
        let blur = TextureDesc::new(w, h, TexFormat::Rgba16, TextureFlags::FILTER);
        sync.texture(owner, TexSlot::DofDownFar, far)?;
        sync.texture(owner, TexSlot::DofCoc, coc)?;
        sync.texture(owner, TexSlot::DofFarBlur, blur)?;
        sync.texture(owner, TexSlot::DofNearBlur, blur)?;

        sync.framebuffer(
            owner,
            FbSlot::DofDown,
            &[
                (AttachPoint::Color(0), near_source.slot()),
                (AttachPoint::Color(1), TexSlot::DofDownFar),
                (AttachPoint::Color(2), TexSlot::DofCoc),
            ],
        )?;
        sync.framebuffer(
            owner,
            FbSlot::DofScatterFar,
            &[(AttachPoint::Color(0), TexSlot::DofFarBlur)],
        )?;
        sync.framebuffer(
            owner,
            FbSlot::DofScatterNear,
            &[(AttachPoint::Color(0), TexSlot::DofNearBlur)],
        )?;
    } else {
        sync.release(
            &[
                TexSlot::DofDownNear,
                TexSlot::DofDownFar,
                TexSlot::DofCoc,
                TexSlot::DofFarBlur,
                TexSlot::DofNearBlur,
            ],
            &[FbSlot::DofDown, FbSlot::DofScatterFar, FbSlot::DofScatterNear],
        );
    }

    fx.dof.near_source = near_source;
    Ok(())
}

fn sync_volumetric(sync: &mut Sync<'_>, fx: &EffectsState) -> Result<()> {
    let owner = EffectFlags::VOLUMETRIC;
    let all = [TexSlot::Volumetric, TexSlot::VolumetricTransmit];
    if !fx.is_enabled(owner) {
        sync.release(&all, &[FbSlot::Volumetric]);
        return Ok(());
    }

    let colored = fx.volumetric.colored_transmittance;
    if sync.allocator.has_framebuffer(FbSlot::Volumetric)
        && sync.allocator.is_bound(TexSlot::VolumetricTransmit) != colored
    {
        log::debug!("Volumetric transmittance mode changed, colored: {colored}");
        sync.release(&all, &[FbSlot::Volumetric]);
    }

    let (w, h) = fx.volumetric.size;
    let flags = TextureFlags::MIPMAP | TextureFlags::FILTER | TextureFlags::TEMP;
    if colored {
        let desc = TextureDesc::new(w, h, TexFormat::Rgb11, flags);
        sync.texture(owner, TexSlot::Volumetric, desc)?;
        sync.texture(owner, TexSlot::VolumetricTransmit, desc)?;
        sync.framebuffer(
            owner,
            FbSlot::Volumetric,
            &[
                (AttachPoint::Color(0), TexSlot::Volumetric),
                (AttachPoint::Color(1), TexSlot::VolumetricTransmit),
            ],
        )
    } else {
        let desc = TextureDesc::new(w, h, TexFormat::Rgba16, flags);
        sync.texture(owner, TexSlot::Volumetric, desc)?;
        sync.framebuffer(
            owner,
            FbSlot::Volumetric,
            &[(AttachPoint::Color(0), TexSlot::Volumetric)],
        )
    }
}

fn sync_ssr(sync: &mut Sync<'_>, fx: &EffectsState) -> Result<()> {
    let owner = EffectFlags::SSR;
    let rays = if fx.is_enabled(owner) {
        fx.ssr.ray_count.clamp(1, MAX_SSR_RAYS) as u8
    } else {
        0
    };

    for i in rays..MAX_SSR_RAYS as u8 {
        sync.release(&[TexSlot::SsrHit(i)], &[]);
    }
    if rays == 0 {
        sync.release(&[], &[FbSlot::ScreenTracing]);
        return Ok(());
    }

    let (w, h) = fx.ssr.tracing_size;
    let desc = TextureDesc::new(w, h, TexFormat::Rgba16, TextureFlags::TEMP);
    let mut layout = Vec::with_capacity(rays as usize);
    for i in 0..rays {
        sync.texture(owner, TexSlot::SsrHit(i), desc)?;
        layout.push((AttachPoint::Color(i), TexSlot::SsrHit(i)));
    }
    sync.framebuffer(owner, FbSlot::ScreenTracing, &layout)
}

/// Host inputs sampled by each effect.
fn externals_needed(enabled: EffectFlags) -> impl Iterator<Item = ExternalTexture> {
    ExternalTexture::ALL.into_iter().filter(move |ext| {
        let ssr = enabled.contains(EffectFlags::SSR)
            && matches!(
                ext,
                ExternalTexture::ProbeCubes
                    | ExternalTexture::ProbePlanars
                    | ExternalTexture::PlanarDepth
                    | ExternalTexture::UtilTex
            );
        let volumetric = enabled.contains(EffectFlags::VOLUMETRIC)
            && matches!(
                ext,
                ExternalTexture::ShadowCubePool
                    | ExternalTexture::ShadowCascadePool
                    | ExternalTexture::IrradianceGrid
                    | ExternalTexture::UtilTex
            );
        ssr || volumetric
    })
}

fn sync_placeholders(sync: &mut Sync<'_>, enabled: EffectFlags) -> Result<()> {
    let needed: Vec<_> = externals_needed(enabled).collect();
    for ext in ExternalTexture::ALL {
        let slot = TexSlot::External(ext);
        if sync.allocator.is_imported(slot) {
            continue;
        }
        if needed.contains(&ext) {
            let format = if ext.sample_kind().is_depth() {
                TexFormat::Depth
            } else {
                TexFormat::Rgba16
            };
            let desc = TextureDesc::new(1, 1, format, TextureFlags::empty());
            sync.texture(EffectFlags::empty(), slot, desc)?;
        } else {
            sync.release(&[slot], &[]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::HeadlessBackend;
    use crate::renderer::effects::resolve;
    use crate::renderer::context::{FrameInput, ViewState};
    use crate::settings::{EffectSettings, PostFxConfig};
    use glam::Mat4;

    fn resolved(settings: &EffectSettings, size: (u32, u32)) -> EffectsState {
        let view = ViewState::new(
            size.0,
            size.1,
            Mat4::IDENTITY,
            Mat4::perspective_rh(1.0, size.0 as f32 / size.1 as f32, 0.1, 100.0),
        );
        let mut fx = EffectsState::new();
        resolve(&FrameInput::new(settings, view), &PostFxConfig::default(), &mut fx);
        fx
    }

    #[test]
    fn disabled_effects_own_only_the_scene_targets() {
        let mut alloc = ResourceAllocator::new();
        let mut backend = HeadlessBackend::new();
        let mut fx = resolved(&EffectSettings::default(), (640, 480));

        let changes =
            sync_resources(&mut alloc, &mut backend, &mut fx, EffectFlags::empty(), 16).unwrap();
        assert!(changes.newly_enabled.is_empty());
        assert!(!changes.history_valid);
        // Color, SceneDepth, MinZ, MaxZ.
        assert_eq!(alloc.owned_slot_count(), 4);
        assert!(!alloc.is_bound(TexSlot::ColorPost));
    }

    #[test]
    fn bloom_levels_follow_the_chain_length() {
        let mut alloc = ResourceAllocator::new();
        let mut backend = HeadlessBackend::new();
        let mut settings = EffectSettings::default();
        settings.bloom.enabled = true;
        let mut fx = resolved(&settings, (1920, 1080));
        let count = fx.bloom.iteration_count;

        let changes =
            sync_resources(&mut alloc, &mut backend, &mut fx, EffectFlags::empty(), 16).unwrap();
        assert!(changes.recreated.contains(EffectFlags::BLOOM));
        assert!(alloc.is_bound(TexSlot::BloomDownsample(count as u8 - 1)));
        assert!(!alloc.is_bound(TexSlot::BloomDownsample(count as u8)));
        assert!(alloc.is_bound(TexSlot::BloomUpsample(count as u8 - 2)));
        assert!(!alloc.is_bound(TexSlot::BloomUpsample(count as u8 - 1)));

        let enabled = fx.enabled;
        let again = sync_resources(&mut alloc, &mut backend, &mut fx, enabled, 16).unwrap();
        assert!(again.recreated.is_empty());

        fx.enabled = EffectFlags::empty();
        sync_resources(&mut alloc, &mut backend, &mut fx, EffectFlags::BLOOM, 16).unwrap();
        assert!(!alloc.is_bound(TexSlot::BloomBlit));
        assert!(!alloc.is_bound(TexSlot::BloomDownsample(0)));
        assert!(!alloc.is_bound(TexSlot::ColorPost));
    }

    #[test]
    fn history_is_valid_only_once_it_survives_a_frame() {
        let mut alloc = ResourceAllocator::new();
        let mut backend = HeadlessBackend::new();
        let mut settings = EffectSettings::default();
        settings.ssr.enabled = true;
        let mut fx = resolved(&settings, (320, 240));

        let first =
            sync_resources(&mut alloc, &mut backend, &mut fx, EffectFlags::empty(), 16).unwrap();
        assert!(!first.history_valid);
        let enabled = fx.enabled;
        let second = sync_resources(&mut alloc, &mut backend, &mut fx, enabled, 16).unwrap();
        assert!(second.history_valid);

        // Untouched imports stay placeholders until the host provides them.
        assert!(alloc.is_bound(TexSlot::External(ExternalTexture::ProbeCubes)));
        assert!(!alloc.is_imported(TexSlot::External(ExternalTexture::ProbeCubes)));
    }

    #[test]
    fn colored_transmittance_switch_rebuilds_the_volumetric_target() {
        let mut alloc = ResourceAllocator::new();
        let mut backend = HeadlessBackend::new();
        let mut fx = resolved(&EffectSettings::default(), (320, 240));
        fx.enabled = EffectFlags::VOLUMETRIC;
        fx.volumetric.size = (160, 120);

        sync_resources(&mut alloc, &mut backend, &mut fx, EffectFlags::empty(), 16).unwrap();
        assert!(!alloc.is_bound(TexSlot::VolumetricTransmit));

        fx.volumetric.colored_transmittance = true;
        let enabled = fx.enabled;
        let changes = sync_resources(&mut alloc, &mut backend, &mut fx, enabled, 16).unwrap();
        assert!(changes.recreated.contains(EffectFlags::VOLUMETRIC));
        assert!(alloc.is_bound(TexSlot::VolumetricTransmit));
        assert_eq!(
            alloc.desc(TexSlot::Volumetric).map(|d| d.format),
            Some(TexFormat::Rgb11)
        );
    }
}
