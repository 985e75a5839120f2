//! Effect Configuration Resolver
//!
//! Turns the option set and the frame's view, camera and scene data into the
//! [`EffectsState`] of the frame: which effects run, and every numeric
//! parameter their passes bind.
//!
//! Effects whose preconditions are missing (no camera for depth of field or
//! motion blur, no world volume for volumetrics) are skipped silently.

use glam::{Mat4, Vec2, Vec3, Vec4};
use smallvec::SmallVec;

use super::EffectFlags;
use super::state::{
    AoParams, BloomParams, DofParams, EffectsState, MotionBlurParams, SceneCounters, SsrParams,
    VolumetricParams,
};
use crate::renderer::context::FrameInput;
use crate::settings::{
    BloomSettings, DepthOfFieldSettings, MAX_SSR_RAYS, MotionBlurSettings, PostFxConfig, SsrSettings,
    VolumetricSettings,
};

/// Tolerance used when comparing the re-evaluated camera with the live view.
const CAMERA_MATCH_EPSILON: f32 = 1e-4;

/// Resolves the frame's effects into `fx` and returns the enabled set.
///
/// `fx.prev_view_projection` and the indirection fields are left untouched.
pub fn resolve(input: &FrameInput<'_>, config: &PostFxConfig, fx: &mut EffectsState) -> EffectFlags {
    let settings = input.settings;
    let view = &input.view;

    fx.viewport = view.size();
    fx.view_projection = view.view_projection;
    fx.inv_view_projection = view.view_projection.inverse();
    fx.view_vecs = view_vecs(&view.projection);
    fx.image_render = input.image_render;

    let ao = &settings.ambient_occlusion;
    fx.ao = AoParams {
        distance: ao.distance,
        factor: ao.factor,
        samples: ao.samples as f32,
    };
    let scene = &input.scene;
    fx.scene = SceneCounters {
        light_count: scene.light_count,
        probe_count: scene.probe_count,
        planar_count: scene.planar_count,
        grid_count: scene.grid_count,
        lod_cube_max: scene.lod_cube_max,
        lod_planar_max: scene.lod_planar_max,
    };

    let mut enabled = EffectFlags::empty();
    if resolve_motion_blur(&settings.motion_blur, input, fx) {
        enabled |= EffectFlags::MOTION_BLUR;
    }
    if resolve_bloom(&settings.bloom, fx.viewport, config, fx) {
        enabled |= EffectFlags::BLOOM;
    }
    if resolve_dof(&settings.dof, input, fx) {
        enabled |= EffectFlags::DOF;
    }
    if resolve_volumetric(&settings.volumetrics, input, fx) {
        enabled |= EffectFlags::VOLUMETRIC;
    }
    if resolve_ssr(&settings.ssr, fx.viewport, fx) {
        enabled |= EffectFlags::SSR | EffectFlags::DOUBLE_BUFFER;
    }

    fx.enabled = enabled;
    enabled
}

// ============================================================================
// Bloom
// ============================================================================

/// Bloom chain length and upsample scale for a `width`×`height` image.
///
/// `floor(radius - 8 + log2(min(width, height)))`, clamped to
/// `[1, max_step]`. The fractional part widens the upsample filter.
#[must_use]
pub fn bloom_iterations(radius: f32, width: u32, height: u32, max_step: u32) -> (u32, f32) {
    let min_dim = width.min(height).max(1) as f32;
    let max_iter = (radius - 8.0) + min_dim.log2();
    let whole = max_iter.floor();
    let count = (whole as i64).clamp(1, i64::from(max_step.max(1))) as u32;
    (count, 0.5 + max_iter - whole)
}

/// Soft threshold curve `{threshold - knee, 2 knee, 0.25 / knee, threshold}`.
#[must_use]
pub fn soft_knee_curve(threshold: f32, knee: f32) -> Vec4 {
    Vec4::new(
        threshold - knee,
        knee * 2.0,
        0.25 / knee.max(1e-5),
        threshold,
    )
}

fn resolve_bloom(
    settings: &BloomSettings,
    (width, height): (u32, u32),
    config: &PostFxConfig,
    fx: &mut EffectsState,
) -> bool {
    if !settings.enabled {
        return false;
    }

    let (iteration_count, sample_scale) =
        bloom_iterations(settings.radius, width, height, config.max_bloom_step);
    let blit_size = (width.max(1), height.max(1));

    let mut down_sizes = SmallVec::new();
    let mut down_texel_sizes = SmallVec::new();
    let mut size = blit_size;
    for _ in 0..iteration_count {
        size = ((size.0 / 2).max(2), (size.1 / 2).max(2));
        down_sizes.push(size);
        down_texel_sizes.push(texel_size(size));
    }

    fx.bloom = BloomParams {
        iteration_count,
        sample_scale,
        curve_threshold: soft_knee_curve(settings.threshold, settings.knee),
        intensity: settings.intensity,
        high_quality: settings.high_quality,
        source_texel_size: texel_size((width, height)),
        blit_size,
        blit_texel_size: texel_size(blit_size),
        down_sizes,
        down_texel_sizes,
    };
    true
}

#[inline]
fn texel_size((w, h): (u32, u32)) -> Vec2 {
    Vec2::new(1.0 / w.max(1) as f32, 1.0 / h.max(1) as f32)
}

// ============================================================================
// Camera effects
// ============================================================================

fn resolve_motion_blur(
    settings: &MotionBlurSettings,
    input: &FrameInput<'_>,
    fx: &mut EffectsState,
) -> bool {
    if !settings.enabled {
        return false;
    }
    let Some(camera) = input.active_camera() else {
        return false;
    };

    let time = input.scene.frame_time;
    let current = camera.view_projection_at(time);

    // The live view diverges while the camera is keyed or edited.
    if !current.abs_diff_eq(input.view.view_projection, CAMERA_MATCH_EPSILON) {
        log::debug!("Camera does not match its animation, skipping motion blur");
        return false;
    }

    fx.motion_blur = MotionBlurParams {
        samples: settings.samples.max(1),
        current_ndc_to_world: current.inverse(),
        past_world_to_ndc: camera.view_projection_at(time - settings.shutter),
    };
    true
}

fn resolve_dof(settings: &DepthOfFieldSettings, input: &FrameInput<'_>, fx: &mut EffectsState) -> bool {
    if !settings.enabled {
        return false;
    }
    let Some(camera) = input.active_camera() else {
        return false;
    };

    let lens = camera.lens();
    let (width, height) = input.view.size();

    // Lens data is in millimetres; the shader works in scene units.
    let scale = input
        .scene
        .unit_scale
        .filter(|s| *s > 0.0)
        .unwrap_or(1.0);
    let scale_camera = 0.001 / scale;
    let aperture = 0.5 * scale_camera * lens.focal_length / settings.f_stop.max(1e-3);
    let focal_len_scaled = scale_camera * lens.focal_length;
    let sensor_scaled = scale_camera * lens.sensor_size;
    let focus = lens.focus_distance;

    let ratio = if settings.ratio.abs() > f32::EPSILON {
        1.0 / settings.ratio
    } else {
        1.0
    };

    fx.dof = DofParams {
        near_far: Vec2::new(-lens.clip_start, -lens.clip_end),
        params: Vec3::new(
            aperture * (focal_len_scaled / (focus - focal_len_scaled)).abs(),
            -focus,
            width as f32 / (lens.frame_scale * sensor_scaled),
        ),
        bokeh: Vec4::new(
            settings.blades,
            settings.rotation,
            ratio,
            settings.max_bokeh_size,
        ),
        layer_select: Vec2::ZERO,
        size: ((width / 2).max(1), (height / 2).max(1)),
        near_source: fx.dof.near_source,
    };
    true
}

// ============================================================================
// Volumetrics & SSR
// ============================================================================

fn resolve_volumetric(
    settings: &VolumetricSettings,
    input: &FrameInput<'_>,
    fx: &mut EffectsState,
) -> bool {
    if !settings.enabled || input.scene.world_volume.is_none() {
        return false;
    }

    // View space looks down -Z.
    let (mut start, mut end) = (-settings.start, -settings.end);
    if !input.view.is_perspective() {
        let near_z = fx.view_vecs[0].z;
        let far_z = near_z + fx.view_vecs[1].z;
        let (lo, hi) = (near_z.min(far_z), near_z.max(far_z));
        start = start.clamp(lo, hi);
        end = end.clamp(lo, hi);
    }

    let (width, height) = fx.viewport;
    fx.volumetric = VolumetricParams {
        start,
        end,
        integration_steps: settings.samples.max(1) as f32,
        shadow_steps: settings.shadow_samples.max(1) as f32,
        sample_distribution: settings.sample_distribution,
        light_clamp: if settings.light_clamp == 0.0 {
            f32::MAX
        } else {
            settings.light_clamp
        },
        use_lights: settings.lights,
        use_shadows: settings.shadows,
        colored_transmittance: settings.colored_transmittance,
        size: ((width / 2).max(1), (height / 2).max(1)),
    };
    true
}

fn resolve_ssr(settings: &SsrSettings, (width, height): (u32, u32), fx: &mut EffectsState) -> bool {
    if !settings.enabled {
        return false;
    }

    let full_res = !settings.half_res;
    let divisor = if full_res { 1 } else { 2 };

    fx.ssr = SsrParams {
        quality: 1.0 - settings.quality,
        thickness: settings.thickness,
        pixel_size: texel_size((width, height)),
        ray_count: settings.ray_count.clamp(1, MAX_SSR_RAYS),
        full_res,
        tracing_size: ((width / divisor).max(1), (height / divisor).max(1)),
        normalize: settings.normalize_weight,
        max_roughness: settings.max_roughness,
        border_fade: settings.border_fade,
        firefly_factor: if settings.firefly_clamp < 1e-8 {
            f32::MAX
        } else {
            settings.firefly_clamp
        },
    };
    true
}

// ============================================================================
// View vectors
// ============================================================================

/// Frustum vectors used to rebuild view-space positions from depth.
///
/// Perspective: `[0].xy` is the bottom-left corner at `z = 1`, `[1].xy` the
/// extent to the top-right corner, `[0].z` the near plane and `[1].z` the
/// signed near-to-far distance. Orthographic: `[0]` is the near bottom-left
/// corner and `[1]` the vector to the far top-right corner. `[1].w` is 1 for
/// perspective projections.
#[must_use]
pub fn view_vecs(projection: &Mat4) -> [Vec4; 2] {
    let inv = projection.inverse();
    let perspective = projection.w_axis.w == 0.0;

    let mut corners = [
        Vec3::new(-1.0, -1.0, 0.0),
        Vec3::new(1.0, -1.0, 0.0),
        Vec3::new(-1.0, 1.0, 0.0),
        Vec3::new(-1.0, -1.0, 1.0),
    ]
    .map(|c| inv.project_point3(c));

    if perspective {
        for c in &mut corners {
            let z = c.z;
            c.x /= z;
            c.y /= z;
        }
    }

    [
        corners[0].extend(1.0),
        Vec4::new(
            corners[1].x - corners[0].x,
            corners[2].y - corners[0].y,
            corners[3].z - corners[0].z,
            if perspective { 1.0 } else { 0.0 },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::context::{CameraLens, CameraRig, ViewState, WorldVolume};
    use crate::settings::EffectSettings;
    use std::borrow::Cow;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-4 * a.abs().max(b.abs()).max(1.0)
    }

    struct StillCamera(Mat4);

    impl CameraRig for StillCamera {
        fn view_projection_at(&self, _time: f32) -> Mat4 {
            self.0
        }
        fn lens(&self) -> CameraLens {
            CameraLens::default()
        }
    }

    struct Fog;

    impl WorldVolume for Fog {
        fn id(&self) -> u64 {
            1
        }
        fn shader_code(&self) -> Cow<'_, str> {
            Cow::Borrowed("")
        }
    }

    fn perspective_view(w: u32, h: u32) -> ViewState {
        let proj = Mat4::perspective_rh(0.8, w as f32 / h as f32, 0.1, 100.0);
        ViewState::new(w, h, Mat4::IDENTITY, proj)
    }

    #[test]
    fn bloom_iteration_scenario() {
        let (count, scale) = bloom_iterations(6.0, 1920, 1080, 16);
        assert_eq!(count, 8);
        let expected = 0.5 + (6.0 - 8.0 + 1080f32.log2()).fract();
        assert!(approx(scale, expected));
    }

    #[test]
    fn bloom_iterations_are_clamped_and_monotonic() {
        let mut last = 0;
        for radius in [0.0, 1.0, 2.5, 4.0, 6.5, 8.0, 10.0, 30.0] {
            let (count, _) = bloom_iterations(radius, 800, 600, 16);
            assert!((1..=16).contains(&count));
            assert!(count >= last);
            last = count;
        }
        let mut last = 0;
        for dim in [1, 2, 16, 256, 1024, 4096, 1 << 20] {
            let (count, _) = bloom_iterations(6.5, dim, dim, 16);
            assert!((1..=16).contains(&count));
            assert!(count >= last);
            last = count;
        }
    }

    #[test]
    fn bloom_chain_starts_at_full_resolution() {
        let mut settings = EffectSettings::default();
        settings.bloom.enabled = true;
        settings.bloom.radius = 6.0;
        let input = FrameInput::new(&settings, perspective_view(1920, 1080));
        let mut fx = EffectsState::new();
        assert!(resolve(&input, &PostFxConfig::default(), &mut fx).contains(EffectFlags::BLOOM));

        assert_eq!(fx.bloom.blit_size, (1920, 1080));
        assert_eq!(fx.bloom.down_sizes.len(), 8);
        assert_eq!(fx.bloom.down_sizes[0], (960, 540));
        assert_eq!(fx.bloom.down_sizes[1], (480, 270));
        assert_eq!(fx.bloom.blit_texel_size, fx.bloom.source_texel_size);
        assert!(approx(fx.bloom.down_texel_sizes[0].x, 1.0 / 960.0));
    }

    #[test]
    fn soft_knee_packs_threshold() {
        let curve = soft_knee_curve(0.8, 0.5);
        assert!(approx(curve.x, 0.3));
        assert!(approx(curve.y, 1.0));
        assert!(approx(curve.z, 0.5));
        assert!(approx(curve.w, 0.8));
        assert!(soft_knee_curve(1.0, 0.0).z.is_finite());
    }

    #[test]
    fn ssr_clamps_ray_count_and_firefly() {
        let mut settings = EffectSettings::default();
        settings.ssr.enabled = true;
        settings.ssr.ray_count = 6;
        settings.ssr.firefly_clamp = 0.0;
        let input = FrameInput::new(&settings, perspective_view(1280, 720));
        let mut fx = EffectsState::new();

        let flags = resolve(&input, &PostFxConfig::default(), &mut fx);
        assert!(flags.contains(EffectFlags::SSR | EffectFlags::DOUBLE_BUFFER));
        assert_eq!(fx.ssr.ray_count, 4);
        assert_eq!(fx.ssr.firefly_factor, f32::MAX);
        assert_eq!(fx.ssr.tracing_size, (640, 360));
        assert!(approx(fx.ssr.quality, 0.75));
    }

    #[test]
    fn zero_light_clamp_disables_clamping() {
        let mut settings = EffectSettings::default();
        settings.volumetrics.enabled = true;
        settings.volumetrics.light_clamp = 0.0;
        let fog = Fog;
        let mut input = FrameInput::new(&settings, perspective_view(640, 480));
        input.scene.world_volume = Some(&fog);
        let mut fx = EffectsState::new();

        let flags = resolve(&input, &PostFxConfig::default(), &mut fx);
        assert!(flags.contains(EffectFlags::VOLUMETRIC));
        assert_eq!(fx.volumetric.light_clamp, f32::MAX);
        assert!(approx(fx.volumetric.start, -0.1));
        assert!(approx(fx.volumetric.end, -100.0));
    }

    #[test]
    fn volumetrics_need_a_world_volume() {
        let mut settings = EffectSettings::default();
        settings.volumetrics.enabled = true;
        let input = FrameInput::new(&settings, perspective_view(640, 480));
        let mut fx = EffectsState::new();
        assert!(!resolve(&input, &PostFxConfig::default(), &mut fx).contains(EffectFlags::VOLUMETRIC));
    }

    #[test]
    fn orthographic_bounds_stay_inside_clip_range() {
        let mut settings = EffectSettings::default();
        settings.volumetrics.enabled = true;
        settings.volumetrics.start = 0.0;
        settings.volumetrics.end = 500.0;
        let fog = Fog;
        let proj = Mat4::orthographic_rh(-5.0, 5.0, -5.0, 5.0, 1.0, 50.0);
        let mut input = FrameInput::new(&settings, ViewState::new(640, 480, Mat4::IDENTITY, proj));
        input.scene.world_volume = Some(&fog);
        let mut fx = EffectsState::new();

        resolve(&input, &PostFxConfig::default(), &mut fx);
        assert!(approx(fx.volumetric.start, -1.0));
        assert!(approx(fx.volumetric.end, -50.0));
    }

    #[test]
    fn camera_effects_need_the_camera_view() {
        let mut settings = EffectSettings::default();
        settings.dof.enabled = true;
        settings.motion_blur.enabled = true;
        let view = perspective_view(800, 600);
        let camera = StillCamera(view.view_projection);

        let mut input = FrameInput::new(&settings, view);
        input.camera = Some(&camera);
        let mut fx = EffectsState::new();
        assert!(resolve(&input, &PostFxConfig::default(), &mut fx).is_empty());

        input.view = view.through_camera();
        let flags = resolve(&input, &PostFxConfig::default(), &mut fx);
        assert!(flags.contains(EffectFlags::DOF | EffectFlags::MOTION_BLUR));
        assert_eq!(fx.dof.size, (400, 300));
        assert!(approx(fx.dof.near_far.x, -0.1));
        assert!(approx(fx.dof.params.y, -10.0));
    }

    #[test]
    fn edited_camera_skips_motion_blur() {
        let mut settings = EffectSettings::default();
        settings.motion_blur.enabled = true;
        let view = perspective_view(800, 600).through_camera();
        let camera = StillCamera(Mat4::from_translation(Vec3::X) * view.view_projection);
        let matching = StillCamera(view.view_projection);

        let mut input = FrameInput::new(&settings, view);
        input.camera = Some(&camera);
        let mut fx = EffectsState::new();
        assert!(!resolve(&input, &PostFxConfig::default(), &mut fx).contains(EffectFlags::MOTION_BLUR));

        input.image_render = true;
        assert!(!resolve(&input, &PostFxConfig::default(), &mut fx).contains(EffectFlags::MOTION_BLUR));

        input.camera = Some(&matching);
        assert!(resolve(&input, &PostFxConfig::default(), &mut fx).contains(EffectFlags::MOTION_BLUR));
    }

    #[test]
    fn perspective_view_vecs_hold_clip_planes() {
        let proj = Mat4::perspective_rh(0.8, 1.5, 0.1, 100.0);
        let vv = view_vecs(&proj);
        assert!(approx(vv[0].z, -0.1));
        assert!(approx(vv[0].z + vv[1].z, -100.0));
    }
}
