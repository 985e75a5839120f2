//! Effect Lifetime Tests
//!
//! Tests for:
//! - Allocation on enable, release on disable
//! - Depth of field sharing bloom's first downsample level
//! - Pass rebuilds on structural setting changes only
//! - Volumetric transmittance mode switches
//! - Shader failures masking their effect
//! - Host imports and placeholders

use std::borrow::Cow;

use glam::{Mat4, Vec3};
use myth_postfx::renderer::graph::PassState;
use myth_postfx::renderer::pipeline::Program;
use myth_postfx::{
    CameraLens, CameraRig, EffectFlags, EffectSettings, ExternalTexture, FbSlot, FrameInput,
    FrameOutput, HeadlessBackend, PostFxConfig, PostFxEngine, TexFormat, TexSlot, TextureDesc,
    TextureFlags, TextureId, ViewState, ViewportId, WorldVolume,
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

struct HeightFog {
    id: u64,
}

impl WorldVolume for HeightFog {
    fn id(&self) -> u64 {
        self.id
    }

    fn shader_code(&self) -> Cow<'_, str> {
        Cow::Borrowed(
            "fn volume_properties(world_pos: vec3<f32>) -> VolumeProperties {
    var props: VolumeProperties;
    let density = exp(-max(world_pos.y, 0.0));
    props.scattering = vec3<f32>(0.1 * density);
    props.absorption = vec3<f32>(0.02 * density);
    props.emission = vec3<f32>(0.0);
    props.anisotropy = 0.3;
    return props;
}",
        )
    }
}

fn view_state() -> ViewState {
    let view = Mat4::look_at_rh(Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO, Vec3::Y);
    let projection = Mat4::perspective_rh(0.8, W as f32 / H as f32, 0.1, 100.0);
    ViewState::new(W, H, view, projection).through_camera()
}

fn engine_with(backend: HeadlessBackend) -> (PostFxEngine<HeadlessBackend>, ViewportId) {
    let mut engine = PostFxEngine::new(backend, PostFxConfig::default()).unwrap();
    let viewport = engine.create_viewport();
    (engine, viewport)
}

fn new_engine() -> (PostFxEngine<HeadlessBackend>, ViewportId) {
    engine_with(HeadlessBackend::new())
}

fn render_with_volume(
    engine: &mut PostFxEngine<HeadlessBackend>,
    viewport: ViewportId,
    settings: &EffectSettings,
    volume: Option<&dyn WorldVolume>,
) -> FrameOutput {
    let view = view_state();
    let camera = FixedCamera(view.view_projection);
    let mut input = FrameInput::new(settings, view);
    input.camera = Some(&camera);
    input.scene.world_volume = volume;
    engine.render_frame(viewport, &input).unwrap()
}

fn render(
    engine: &mut PostFxEngine<HeadlessBackend>,
    viewport: ViewportId,
    settings: &EffectSettings,
) -> FrameOutput {
    render_with_volume(engine, viewport, settings, None)
}

fn is_bound(engine: &PostFxEngine<HeadlessBackend>, viewport: ViewportId, slot: TexSlot) -> bool {
    engine.viewport(viewport).unwrap().allocator().is_bound(slot)
}

fn build_count(
    engine: &PostFxEngine<HeadlessBackend>,
    viewport: ViewportId,
    effect: EffectFlags,
) -> u32 {
    engine.viewport(viewport).unwrap().passes().build_count(effect)
}

// ============================================================================
// Allocation & release
// ============================================================================

#[test]
fn disabling_bloom_releases_its_textures() {
    let (mut engine, vp) = new_engine();
    let mut settings = EffectSettings::default();
    settings.bloom.enabled = true;

    render(&mut engine, vp, &settings);
    assert!(is_bound(&engine, vp, TexSlot::BloomBlit));
    assert!(is_bound(&engine, vp, TexSlot::BloomDownsample(0)));
    assert!(is_bound(&engine, vp, TexSlot::ColorPost));
    let live_with_bloom = engine.backend().live_texture_count();

    settings.bloom.enabled = false;
    let out = render(&mut engine, vp, &settings);
    assert!(!out.enabled.contains(EffectFlags::BLOOM));
    assert!(!is_bound(&engine, vp, TexSlot::BloomBlit));
    assert!(!is_bound(&engine, vp, TexSlot::BloomDownsample(0)));
    assert!(!is_bound(&engine, vp, TexSlot::ColorPost));
    assert!(engine.backend().live_texture_count() < live_with_bloom);
    assert!(!engine.viewport(vp).unwrap().passes().is_built(EffectFlags::BLOOM));
}

#[test]
fn ssr_inputs_follow_ssr() {
    let (mut engine, vp) = new_engine();
    let mut settings = EffectSettings::default();
    settings.ssr.enabled = true;

    render(&mut engine, vp, &settings);
    assert!(is_bound(&engine, vp, TexSlot::SsrNormalInput));
    assert!(is_bound(&engine, vp, TexSlot::SsrSpecRoughInput));
    assert!(is_bound(&engine, vp, TexSlot::ColorDoubleBuffer));

    settings.ssr.enabled = false;
    render(&mut engine, vp, &settings);
    assert!(!is_bound(&engine, vp, TexSlot::SsrNormalInput));
    assert!(!is_bound(&engine, vp, TexSlot::SsrSpecRoughInput));
    assert!(!is_bound(&engine, vp, TexSlot::ColorDoubleBuffer));
    assert!(!is_bound(&engine, vp, TexSlot::SsrHit(0)));
}

#[test]
fn releasing_viewport_destroys_owned_textures() {
    let (mut engine, vp) = new_engine();
    let mut settings = EffectSettings::default();
    settings.bloom.enabled = true;
    settings.ssr.enabled = true;
    render(&mut engine, vp, &settings);
    assert!(engine.backend().live_texture_count() > 0);

    engine.release_viewport(vp);
    assert_eq!(engine.backend().live_texture_count(), 0);
    assert!(engine.viewport(vp).is_none());
    assert!(engine.backend().live_program_count() > 0);

    engine.shutdown();
    assert_eq!(engine.backend().live_program_count(), 0);
}

#[test]
fn viewports_share_compiled_programs() {
    let (mut engine, first) = new_engine();
    let second = engine.create_viewport();
    let mut settings = EffectSettings::default();
    settings.bloom.enabled = true;

    render(&mut engine, first, &settings);
    let compiled = engine.backend().compiled_program_count();
    render(&mut engine, second, &settings);
    assert_eq!(engine.backend().compiled_program_count(), compiled);
    assert_ne!(
        engine.viewport(first).unwrap().texture(TexSlot::Color),
        engine.viewport(second).unwrap().texture(TexSlot::Color)
    );
}

// ============================================================================
// Buffer sharing
// ============================================================================

/// Slot and texture sampled by the near-field scatter draw.
fn scatter_near_source(engine: &PostFxEngine<HeadlessBackend>) -> (TexSlot, TextureId) {
    let scatter = engine
        .backend()
        .draws()
        .iter()
        .find(|d| d.target.fb == FbSlot::DofScatterNear)
        .unwrap();
    let source = scatter.call.texture("color_buffer").unwrap();
    (source.slot, source.texture)
}

#[test]
fn dof_near_field_borrows_bloom_downsample() {
    let (mut engine, vp) = new_engine();
    let mut settings = EffectSettings::default();
    settings.dof.enabled = true;
    settings.bloom.enabled = true;

    render(&mut engine, vp, &settings);
    assert!(!is_bound(&engine, vp, TexSlot::DofDownNear));
    let down0 = engine
        .viewport(vp)
        .unwrap()
        .texture(TexSlot::BloomDownsample(0))
        .unwrap();
    let down = engine
        .backend()
        .draws()
        .iter()
        .find(|d| d.call.pass == "DoF Downsample")
        .unwrap();
    assert_eq!(down.target.colors[0].1.slot, TexSlot::BloomDownsample(0));
    assert_eq!(down.target.colors[0].1.texture, down0);
    assert_eq!(
        scatter_near_source(&engine),
        (TexSlot::BloomDownsample(0), down0)
    );
    assert_eq!(build_count(&engine, vp, EffectFlags::DOF), 1);

    // Bloom takes its level back before drawing into it.
    let bloom_down = engine
        .backend()
        .draws()
        .iter()
        .find(|d| d.call.pass == "Bloom Downsample First")
        .unwrap();
    assert_eq!(bloom_down.target.fb, FbSlot::BloomDown(0));
    assert_eq!(bloom_down.target.colors[0].1.texture, down0);
}

#[test]
fn dof_near_field_switches_back_when_bloom_stops() {
    let (mut engine, vp) = new_engine();
    let mut settings = EffectSettings::default();
    settings.dof.enabled = true;
    settings.bloom.enabled = true;
    render(&mut engine, vp, &settings);
    let framebuffers = engine.viewport(vp).unwrap().allocator().framebuffer_count();

    settings.bloom.enabled = false;
    engine.backend_mut().clear_log();
    render(&mut engine, vp, &settings);

    let viewport = engine.viewport(vp).unwrap();
    assert!(is_bound(&engine, vp, TexSlot::DofDownNear));
    assert!(!is_bound(&engine, vp, TexSlot::BloomDownsample(0)));
    assert!(viewport.allocator().framebuffer_count() < framebuffers);
    let near = viewport.texture(TexSlot::DofDownNear).unwrap();
    let layout = viewport.allocator().framebuffer(FbSlot::DofDown).unwrap();
    assert_eq!(layout.attachments()[0].slot, TexSlot::DofDownNear);

    let down = engine
        .backend()
        .draws()
        .iter()
        .find(|d| d.call.pass == "DoF Downsample")
        .unwrap();
    assert_eq!(down.target.colors[0].1.slot, TexSlot::DofDownNear);
    assert_eq!(scatter_near_source(&engine), (TexSlot::DofDownNear, near));
    // The downsample framebuffer was recreated, so the passes were too.
    assert_eq!(build_count(&engine, vp, EffectFlags::DOF), 2);
}

// ============================================================================
// Rebuilds
// ============================================================================

#[test]
fn only_structural_settings_rebuild_passes() {
    let (mut engine, vp) = new_engine();
    let mut settings = EffectSettings::default();
    settings.bloom.enabled = true;

    for _ in 0..3 {
        render(&mut engine, vp, &settings);
    }
    assert_eq!(build_count(&engine, vp, EffectFlags::BLOOM), 1);

    settings.bloom.intensity = 0.5;
    settings.bloom.threshold = 1.2;
    render(&mut engine, vp, &settings);
    assert_eq!(build_count(&engine, vp, EffectFlags::BLOOM), 1);

    settings.bloom.high_quality = !settings.bloom.high_quality;
    render(&mut engine, vp, &settings);
    assert_eq!(build_count(&engine, vp, EffectFlags::BLOOM), 2);
}

#[test]
fn bloom_intensity_reaches_the_resolve() {
    let (mut engine, vp) = new_engine();
    let mut settings = EffectSettings::default();
    settings.bloom.enabled = true;
    settings.bloom.intensity = 0.25;
    render(&mut engine, vp, &settings);

    let resolve = engine
        .backend()
        .draws()
        .iter()
        .find(|d| d.call.pass == "Bloom Resolve")
        .unwrap();
    let value = resolve.call.uniform("bloom_intensity").unwrap();
    assert_eq!(value, myth_postfx::renderer::graph::UniformValue::Float(0.25));
}

// ============================================================================
// Volumetrics
// ============================================================================

#[test]
fn volumetrics_need_a_world_volume() {
    let (mut engine, vp) = new_engine();
    let mut settings = EffectSettings::default();
    settings.volumetrics.enabled = true;

    let out = render(&mut engine, vp, &settings);
    assert!(!out.enabled.contains(EffectFlags::VOLUMETRIC));
    assert!(!is_bound(&engine, vp, TexSlot::Volumetric));
}

#[test]
fn colored_transmittance_composites_in_two_passes() {
    let (mut engine, vp) = new_engine();
    let fog = HeightFog { id: 7 };
    let mut settings = EffectSettings::default();
    settings.volumetrics.enabled = true;
    settings.volumetrics.colored_transmittance = true;

    let out = render_with_volume(&mut engine, vp, &settings, Some(&fog));
    assert!(out.enabled.contains(EffectFlags::VOLUMETRIC));
    assert!(is_bound(&engine, vp, TexSlot::Volumetric));
    assert!(is_bound(&engine, vp, TexSlot::VolumetricTransmit));

    let draws = engine.backend().draws();
    let transmit = draws
        .iter()
        .find(|d| d.call.pass == "Volumetric Transmittance")
        .unwrap();
    assert!(transmit.call.state.contains(PassState::MULTIPLY));
    let resolve = draws
        .iter()
        .find(|d| d.call.pass == "Volumetric Resolve")
        .unwrap();
    assert!(resolve.call.state.contains(PassState::ADDITIVE));
    let integrate = draws
        .iter()
        .find(|d| d.call.pass == "Volumetric Integration")
        .unwrap();
    assert_eq!(integrate.call.outputs, 2);
}

#[test]
fn transmittance_mode_switch_reallocates() {
    let (mut engine, vp) = new_engine();
    let fog = HeightFog { id: 7 };
    let mut settings = EffectSettings::default();
    settings.volumetrics.enabled = true;
    settings.volumetrics.colored_transmittance = true;
    render_with_volume(&mut engine, vp, &settings, Some(&fog));

    settings.volumetrics.colored_transmittance = false;
    engine.backend_mut().clear_log();
    render_with_volume(&mut engine, vp, &settings, Some(&fog));

    assert!(is_bound(&engine, vp, TexSlot::Volumetric));
    assert!(!is_bound(&engine, vp, TexSlot::VolumetricTransmit));
    assert_eq!(build_count(&engine, vp, EffectFlags::VOLUMETRIC), 2);

    let draws = engine.backend().draws();
    assert!(!draws.iter().any(|d| d.call.pass == "Volumetric Transmittance"));
    let resolve = draws
        .iter()
        .find(|d| d.call.pass == "Volumetric Resolve")
        .unwrap();
    assert!(resolve.call.state.contains(PassState::TRANSMISSION));
    let desc = engine
        .viewport(vp)
        .unwrap()
        .allocator()
        .desc(TexSlot::Volumetric)
        .unwrap();
    assert_eq!(desc.format, TexFormat::Rgba16);
}

#[test]
fn new_material_recompiles_integration() {
    let (mut engine, vp) = new_engine();
    let mut settings = EffectSettings::default();
    settings.volumetrics.enabled = true;

    render_with_volume(&mut engine, vp, &settings, Some(&HeightFog { id: 1 }));
    let compiled = engine.backend().compiled_program_count();
    render_with_volume(&mut engine, vp, &settings, Some(&HeightFog { id: 1 }));
    assert_eq!(engine.backend().compiled_program_count(), compiled);

    render_with_volume(&mut engine, vp, &settings, Some(&HeightFog { id: 2 }));
    assert_eq!(engine.backend().compiled_program_count(), compiled + 1);
    assert_eq!(build_count(&engine, vp, EffectFlags::VOLUMETRIC), 2);
}

// ============================================================================
// Shader failures
// ============================================================================

#[test]
fn failing_shader_masks_only_its_effect() {
    let mut backend = HeadlessBackend::new();
    backend.fail_program(Program::Bloom);
    let (mut engine, vp) = engine_with(backend);

    let mut settings = EffectSettings::default();
    settings.bloom.enabled = true;
    settings.motion_blur.enabled = true;

    let out = render(&mut engine, vp, &settings);
    assert!(out.enabled.contains(EffectFlags::MOTION_BLUR));
    assert!(!out.enabled.contains(EffectFlags::BLOOM));
    assert_eq!(out.swaps, 1);
    assert!(!is_bound(&engine, vp, TexSlot::BloomBlit));
    assert_eq!(engine.backend().displays().len(), 1);
}

#[test]
fn failing_hiz_masks_reflections() {
    let mut backend = HeadlessBackend::new();
    backend.fail_program(Program::MinMaxZ);
    let (mut engine, vp) = engine_with(backend);

    let mut settings = EffectSettings::default();
    settings.ssr.enabled = true;

    let out = render(&mut engine, vp, &settings);
    assert!(!out.enabled.contains(EffectFlags::SSR));
    assert!(!out.enabled.contains(EffectFlags::DOUBLE_BUFFER));
    assert!(!is_bound(&engine, vp, TexSlot::ColorDoubleBuffer));
    assert_eq!(out.exchanges, 0);
    assert_eq!(
        engine
            .create_minmax_buffer(vp, TexSlot::SceneDepth, None)
            .unwrap(),
        0
    );
}

// ============================================================================
// Host textures
// ============================================================================

#[test]
fn missing_host_inputs_get_placeholders() {
    let (mut engine, vp) = new_engine();
    let mut settings = EffectSettings::default();
    settings.ssr.enabled = true;
    render(&mut engine, vp, &settings);

    let viewport = engine.viewport(vp).unwrap();
    let slot = TexSlot::External(ExternalTexture::UtilTex);
    assert!(viewport.allocator().is_bound(slot));
    assert!(!viewport.allocator().is_imported(slot));
    let desc = viewport.allocator().desc(slot).unwrap();
    assert_eq!((desc.width, desc.height), (1, 1));
    assert!(
        !viewport
            .allocator()
            .is_bound(TexSlot::External(ExternalTexture::ShadowCubePool))
    );
}

#[test]
fn imported_textures_are_sampled_and_kept() {
    let (mut engine, vp) = new_engine();
    let slot = TexSlot::External(ExternalTexture::UtilTex);
    let desc = TextureDesc::new(64, 64, TexFormat::Rgba16, TextureFlags::FILTER);
    let util = engine.import_texture(vp, slot, desc).unwrap();

    let mut settings = EffectSettings::default();
    settings.ssr.enabled = true;
    render(&mut engine, vp, &settings);

    let resolve = engine
        .backend()
        .draws()
        .iter()
        .find(|d| d.call.pass == "SSR Resolve")
        .unwrap();
    assert_eq!(resolve.call.texture("util_tex").unwrap().texture, util);

    settings.ssr.enabled = false;
    render(&mut engine, vp, &settings);
    let viewport = engine.viewport(vp).unwrap();
    assert!(viewport.allocator().is_imported(slot));
    assert_eq!(viewport.texture(slot), Some(util));
    assert!(engine.backend().has_texture(util));
}

#[test]
fn imported_scene_depth_is_used_as_is() {
    let (mut engine, vp) = new_engine();
    let desc = TextureDesc::new(W, H, TexFormat::Depth, TextureFlags::empty());
    let depth = engine.import_texture(vp, TexSlot::SceneDepth, desc).unwrap();

    render(&mut engine, vp, &EffectSettings::default());
    assert_eq!(engine.viewport(vp).unwrap().texture(TexSlot::SceneDepth), Some(depth));
    let copy = engine
        .backend()
        .draws()
        .iter()
        .find(|d| d.call.pass == "Min Z Copy")
        .unwrap();
    assert_eq!(copy.call.texture("depth_buffer").unwrap().texture, depth);
}
