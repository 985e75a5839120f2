//! Temporal Effect Tests
//!
//! Tests for:
//! - SSR tracing gated on a valid color history
//! - Ray count clamping
//! - Redraw requests and final image renders
//! - Past view-projection bookkeeping and motion blur camera checks

use glam::{Mat4, Vec3};
use myth_postfx::renderer::graph::{SSR_SENTINEL_HIT, UniformValue};
use myth_postfx::{
    CameraLens, CameraRig, EffectFlags, EffectSettings, FbSlot, FrameInput, FrameOutput,
    HeadlessBackend, PostFxConfig, PostFxEngine, TexSlot, ViewState, ViewportId,
};

const W: u32 = 320;
const H: u32 = 180;

struct FixedCamera(Mat4);

impl CameraRig for FixedCamera {
    fn view_projection_at(&self, _time: f32) -> Mat4 {
        self.0
    }

    fn lens(&self) -> CameraLens {
        CameraLens::default()
    }
}

fn view_from(eye: Vec3, width: u32, height: u32) -> ViewState {
    let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
    let projection = Mat4::perspective_rh(0.8, width as f32 / height as f32, 0.1, 100.0);
    ViewState::new(width, height, view, projection).through_camera()
}

fn new_engine() -> (PostFxEngine<HeadlessBackend>, ViewportId) {
    let mut engine = PostFxEngine::new(HeadlessBackend::new(), PostFxConfig::default()).unwrap();
    let viewport = engine.create_viewport();
    (engine, viewport)
}

fn render_view(
    engine: &mut PostFxEngine<HeadlessBackend>,
    viewport: ViewportId,
    settings: &EffectSettings,
    view: ViewState,
    image_render: bool,
) -> FrameOutput {
    let camera = FixedCamera(view.view_projection);
    let mut input = FrameInput::new(settings, view);
    input.camera = Some(&camera);
    input.image_render = image_render;
    engine.render_frame(viewport, &input).unwrap()
}

fn render(
    engine: &mut PostFxEngine<HeadlessBackend>,
    viewport: ViewportId,
    settings: &EffectSettings,
) -> FrameOutput {
    render_view(engine, viewport, settings, view_from(Vec3::new(0.0, 1.0, 5.0), W, H), false)
}

fn ssr_settings() -> EffectSettings {
    let mut settings = EffectSettings::default();
    settings.ssr.enabled = true;
    settings
}

fn sentinel_clears(engine: &PostFxEngine<HeadlessBackend>) -> usize {
    engine
        .backend()
        .clears()
        .iter()
        .filter(|(target, color, _)| {
            target.fb == FbSlot::ScreenTracing && *color == Some(SSR_SENTINEL_HIT.to_array())
        })
        .count()
}

fn traced(engine: &PostFxEngine<HeadlessBackend>) -> bool {
    engine
        .backend()
        .draws()
        .iter()
        .any(|d| d.call.pass == "SSR Raytrace")
}

// ============================================================================
// History validity
// ============================================================================

#[test]
fn first_ssr_frame_clears_hits_to_sentinel() {
    let (mut engine, vp) = new_engine();
    let out = render(&mut engine, vp, &ssr_settings());

    assert!(out.enabled.contains(EffectFlags::SSR | EffectFlags::DOUBLE_BUFFER));
    assert_eq!(sentinel_clears(&engine), 1);
    assert!(!traced(&engine));
    assert!(out.redraw_requested);
    // The resolve still runs, falling back to probes.
    assert!(
        engine
            .backend()
            .draws()
            .iter()
            .any(|d| d.call.pass == "SSR Resolve")
    );
}

#[test]
fn second_ssr_frame_traces() {
    let (mut engine, vp) = new_engine();
    let settings = ssr_settings();
    render(&mut engine, vp, &settings);

    engine.backend_mut().clear_log();
    let out = render(&mut engine, vp, &settings);
    assert_eq!(sentinel_clears(&engine), 0);
    assert!(traced(&engine));
    assert!(!out.redraw_requested);
    assert!(engine.viewport(vp).unwrap().state().valid_double_buffer);
}

#[test]
fn resize_invalidates_history() {
    let (mut engine, vp) = new_engine();
    let settings = ssr_settings();
    render(&mut engine, vp, &settings);
    render(&mut engine, vp, &settings);

    engine.backend_mut().clear_log();
    let view = view_from(Vec3::new(0.0, 1.0, 5.0), 640, 360);
    let out = render_view(&mut engine, vp, &settings, view, false);
    assert_eq!(sentinel_clears(&engine), 1);
    assert!(!traced(&engine));
    assert!(out.redraw_requested);
}

#[test]
fn reenabling_ssr_starts_without_history() {
    let (mut engine, vp) = new_engine();
    let mut settings = ssr_settings();
    render(&mut engine, vp, &settings);
    render(&mut engine, vp, &settings);

    settings.ssr.enabled = false;
    render(&mut engine, vp, &settings);

    settings.ssr.enabled = true;
    engine.backend_mut().clear_log();
    let out = render(&mut engine, vp, &settings);
    assert_eq!(sentinel_clears(&engine), 1);
    assert!(out.redraw_requested);
}

#[test]
fn image_render_never_requests_redraw() {
    let (mut engine, vp) = new_engine();
    let view = view_from(Vec3::new(0.0, 1.0, 5.0), W, H);
    let out = render_view(&mut engine, vp, &ssr_settings(), view, true);

    assert!(!out.redraw_requested);
    assert_eq!(sentinel_clears(&engine), 1);
    assert!(!traced(&engine));

    // The next sample of the same image has a history to trace against.
    engine.backend_mut().clear_log();
    let out = render_view(&mut engine, vp, &ssr_settings(), view, true);
    assert!(!out.redraw_requested);
    assert_eq!(sentinel_clears(&engine), 0);
    assert!(traced(&engine));
    assert!(engine.viewport(vp).unwrap().state().valid_double_buffer);
}

#[test]
fn history_is_prefiltered_before_resolve() {
    let (mut engine, vp) = new_engine();
    render(&mut engine, vp, &ssr_settings());

    let draws = engine.backend().draws();
    let downsample = draws.iter().position(|d| d.call.pass == "Downsample").unwrap();
    let resolve = draws.iter().position(|d| d.call.pass == "SSR Resolve").unwrap();
    assert!(downsample < resolve);
    let history_mips = draws
        .iter()
        .filter(|d| d.call.pass == "Downsample")
        .count();
    assert!(history_mips <= PostFxConfig::default().history_max_levels as usize - 1);

    let resolve = &draws[resolve].call;
    let history = engine
        .viewport(vp)
        .unwrap()
        .texture(TexSlot::ColorDoubleBuffer);
    // The exchange happens after the resolve, at the end of the frame.
    assert_ne!(Some(resolve.texture("color_buffer").unwrap().texture), history);
}

// ============================================================================
// Ray count
// ============================================================================

#[test]
fn ray_count_is_clamped_to_four() {
    let (mut engine, vp) = new_engine();
    let mut settings = ssr_settings();
    settings.ssr.ray_count = 6;
    render(&mut engine, vp, &settings);

    let allocator = engine.viewport(vp).unwrap().allocator();
    for i in 0..4 {
        assert!(allocator.is_bound(TexSlot::SsrHit(i)));
    }
    assert!(!allocator.is_bound(TexSlot::SsrHit(4)));

    let (target, _, _) = engine
        .backend()
        .clears()
        .iter()
        .find(|(t, _, _)| t.fb == FbSlot::ScreenTracing)
        .unwrap();
    assert_eq!(target.colors.len(), 4);
}

#[test]
fn fewer_rays_release_hit_buffers() {
    let (mut engine, vp) = new_engine();
    let mut settings = ssr_settings();
    settings.ssr.ray_count = 4;
    render(&mut engine, vp, &settings);

    settings.ssr.ray_count = 2;
    engine.backend_mut().clear_log();
    render(&mut engine, vp, &settings);

    let viewport = engine.viewport(vp).unwrap();
    assert!(viewport.allocator().is_bound(TexSlot::SsrHit(1)));
    assert!(!viewport.allocator().is_bound(TexSlot::SsrHit(2)));
    assert!(!viewport.allocator().is_bound(TexSlot::SsrHit(3)));
    assert_eq!(viewport.passes().build_count(EffectFlags::SSR), 2);

    let trace = engine
        .backend()
        .draws()
        .iter()
        .find(|d| d.call.pass == "SSR Raytrace")
        .unwrap();
    assert_eq!(trace.target.colors.len(), 2);
    assert_eq!(trace.call.uniform("ray_count"), Some(UniformValue::Int(2)));
}

// ============================================================================
// Reprojection
// ============================================================================

#[test]
fn past_view_projection_follows_the_camera() {
    let (mut engine, vp) = new_engine();
    let settings = ssr_settings();

    let first = view_from(Vec3::new(0.0, 1.0, 5.0), W, H);
    let out = render_view(&mut engine, vp, &settings, first, false);
    assert_eq!(out.past_view_projection, first.view_projection);

    let second = view_from(Vec3::new(1.0, 1.0, 5.0), W, H);
    engine.backend_mut().clear_log();
    let out = render_view(&mut engine, vp, &settings, second, false);
    assert_eq!(out.past_view_projection, second.view_projection);

    let resolve = engine
        .backend()
        .draws()
        .iter()
        .find(|d| d.call.pass == "SSR Resolve")
        .unwrap();
    assert_eq!(
        resolve.call.uniform("past_view_projection"),
        Some(UniformValue::Mat4(first.view_projection))
    );
}

#[test]
fn motion_blur_needs_the_camera_to_match_the_view() {
    let (mut engine, vp) = new_engine();
    let mut settings = EffectSettings::default();
    settings.motion_blur.enabled = true;

    let view = view_from(Vec3::new(0.0, 1.0, 5.0), W, H);
    let moved = FixedCamera(view_from(Vec3::new(3.0, 1.0, 5.0), W, H).view_projection);
    let still = FixedCamera(view.view_projection);
    let mut input = FrameInput::new(&settings, view);
    input.camera = Some(&moved);

    let out = engine.render_frame(vp, &input).unwrap();
    assert!(!out.enabled.contains(EffectFlags::MOTION_BLUR));

    // Final image renders get no exception.
    input.image_render = true;
    let out = engine.render_frame(vp, &input).unwrap();
    assert!(!out.enabled.contains(EffectFlags::MOTION_BLUR));

    input.camera = Some(&still);
    let out = engine.render_frame(vp, &input).unwrap();
    assert!(out.enabled.contains(EffectFlags::MOTION_BLUR));
}

#[test]
fn motion_blur_samples_are_bound() {
    let (mut engine, vp) = new_engine();
    let mut settings = EffectSettings::default();
    settings.motion_blur.enabled = true;
    settings.motion_blur.samples = 12;
    render(&mut engine, vp, &settings);

    let blur = engine
        .backend()
        .draws()
        .iter()
        .find(|d| d.call.pass == "Motion Blur")
        .unwrap();
    assert_eq!(blur.call.uniform("samples"), Some(UniformValue::Int(12)));
}
